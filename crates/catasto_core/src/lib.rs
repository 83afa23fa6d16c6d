//! Core of the Catasto Storico client.
//!
//! This crate holds everything a front-end needs to talk to the historical
//! land-registry database:
//!
//! - **error**: Error handling with PostgreSQL-specific details
//! - **models**: Connection profiles, command metadata, values and outcomes
//! - **services**: The database collaborator, its PostgreSQL implementation
//!   and local storage for connection defaults
//! - **session**: The connection lifecycle
//! - **commands**: The command registry and its handlers
//! - **controller**: Dispatch and the main loop
//! - **logging**: Structured logging setup

pub mod commands;
pub mod controller;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod session;


pub use commands::{CommandAction, CommandDescriptor, CommandRegistry};
pub use controller::{available_commands, Frontend, MenuChoice, SessionController};
pub use error::{CatastoError, ErrorInfo};
pub use models::{
    Availability, CommandArgs, ConnectionOptions, ConnectionProfile, InputKind, InputSpec,
    Outcome, Payload, ProfileSummary, Secret, SessionStatus, Table, Value,
};
pub use services::{Collaborator, LocalStorage, PostgresCollaborator};
pub use session::Session;
