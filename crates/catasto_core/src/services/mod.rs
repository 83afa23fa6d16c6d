//! Service layer for the Catasto client.
//!
//! - `collaborator` - the database boundary the session talks to
//! - `postgres` - tokio-postgres implementation of that boundary
//! - `sql` - statement text behind each named query and procedure
//! - `storage` - local SQLite store for connection defaults

pub mod collaborator;
pub mod postgres;
pub mod sql;
pub mod storage;

#[cfg(test)]
pub(crate) mod fake;

pub use collaborator::{
    BoundGateway, Collaborator, Gateway, ProcedureId, ProcedureResult, QueryId,
};
pub use postgres::{PgHandle, PostgresCollaborator};
pub use storage::{default_data_dir, init_data_dir, LocalStorage, RecentConnection};
