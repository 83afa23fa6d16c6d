//! Data models for the Catasto client.
//!
//! - `connection` - ConnectionProfile, Secret, ConnectionOptions, SessionStatus
//! - `command` - Availability, InputSpec, CommandArgs
//! - `outcome` - Outcome, Payload
//! - `value` - Value, Table

pub mod command;
pub mod connection;
pub mod outcome;
pub mod value;

pub use command::{Availability, CommandArgs, InputKind, InputSpec};
pub use connection::{
    ConnectionOptions, ConnectionProfile, ConnectionProfileBuilder, ProfileSummary, Secret,
    SessionStatus, DEFAULT_DATABASE, DEFAULT_PORT, DEFAULT_SCHEMA,
};
pub use outcome::{Outcome, Payload};
pub use value::{Table, Value};
