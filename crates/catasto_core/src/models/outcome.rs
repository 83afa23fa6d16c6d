//! Result of dispatching one command.

use crate::error::CatastoError;
use crate::models::{ProfileSummary, Table};

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Tabular rows
    Table(Table),
    /// Free-text document (certificates, reports)
    Document {
        /// Heading shown above the body
        title: String,
        /// Document text
        body: String,
    },
    /// Short status message
    Message(String),
    /// A session was established
    Connected(ProfileSummary),
    /// The loop should end
    Exit,
}

impl Payload {
    /// Build a document payload.
    pub fn document(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Document { title: title.into(), body: body.into() }
    }

    /// Build a message payload.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }
}

/// Rendered result or structured failure.
#[derive(Debug)]
pub enum Outcome {
    /// The command completed
    Success(Payload),
    /// The command failed; the loop continues
    Failure(CatastoError),
}

impl Outcome {
    /// Check for success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check for the exit signal.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Success(Payload::Exit))
    }

    /// Get the payload if successful.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure(_) => None,
        }
    }

    /// Get the table if the payload is tabular.
    pub fn table(&self) -> Option<&Table> {
        match self {
            Self::Success(Payload::Table(table)) => Some(table),
            _ => None,
        }
    }

    /// Get the error if the command failed.
    pub fn error(&self) -> Option<&CatastoError> {
        match self {
            Self::Failure(err) => Some(err),
            Self::Success(_) => None,
        }
    }
}

impl From<Result<Payload, CatastoError>> for Outcome {
    fn from(result: Result<Payload, CatastoError>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(err) => Self::Failure(err),
        }
    }
}
