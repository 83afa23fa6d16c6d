//! Connection profile, options and session status models.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Schema the stored routines live in.
pub const DEFAULT_SCHEMA: &str = "catasto";

/// Database name used by every deployment of the registry.
pub const DEFAULT_DATABASE: &str = "catasto_storico";

/// Current state of the session (one per process).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No connection held
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Live connection with schema scope applied
    Connected,
    /// Last connection attempt failed
    Failed {
        /// Human-readable reason
        reason: String,
    },
}

impl SessionStatus {
    /// Create a failed status.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    /// Check if the session is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the session is disconnected.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Check if the last connection attempt failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Get the failure reason if in failed state.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Short label for menus and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A database password.
///
/// The buffer is wiped when dropped and never shown by `Debug`.
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    /// Wrap a password.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the password for the driver.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Options applied by the PostgreSQL collaborator to every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Connection timeout in seconds (None = driver default)
    pub connect_timeout_secs: Option<u32>,
    /// Statement timeout in seconds (None = server default)
    pub statement_timeout_secs: Option<u32>,
    /// Application name sent to PostgreSQL
    pub application_name: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: None,
            statement_timeout_secs: None,
            application_name: "Catasto".to_string(),
        }
    }
}

/// Parameters for one login.
///
/// Immutable once built; the session drops it on disconnect.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    host: String,
    port: u16,
    database: String,
    schema: String,
    user: String,
    secret: Secret,
}

impl ConnectionProfile {
    /// Create a builder.
    pub fn builder() -> ConnectionProfileBuilder {
        ConnectionProfileBuilder::default()
    }

    /// Server hostname or IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Schema applied to the session's search path.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Login user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Login password.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Validate the profile.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host obbligatorio".to_string());
        }
        if self.port == 0 {
            return Err("La porta deve essere tra 1 e 65535".to_string());
        }
        if self.database.trim().is_empty() || self.database.len() > 63 {
            return Err("Il nome del database deve avere da 1 a 63 caratteri".to_string());
        }
        if self.user.trim().is_empty() {
            return Err("Utente obbligatorio".to_string());
        }
        if !is_plain_identifier(&self.schema) {
            return Err(format!(
                "Lo schema '{}' può contenere solo lettere, cifre e trattini bassi",
                self.schema
            ));
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    /// Same profile on another port, skipping validation.
    #[cfg(test)]
    pub(crate) fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Secret-free view of the profile.
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            schema: self.schema.clone(),
            user: self.user.clone(),
        }
    }
}

/// Builder for ConnectionProfile.
#[derive(Debug, Default)]
pub struct ConnectionProfileBuilder {
    host: Option<String>,
    port: u16,
    database: Option<String>,
    schema: Option<String>,
    user: Option<String>,
    secret: Secret,
}

impl ConnectionProfileBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn secret(mut self, secret: Secret) -> Self {
        self.secret = secret;
        self
    }

    /// Build and validate the profile.
    ///
    /// Missing database, schema and port fall back to the registry defaults.
    pub fn build(self) -> Result<ConnectionProfile, String> {
        let profile = ConnectionProfile {
            host: self.host.ok_or("Host obbligatorio")?,
            port: if self.port == 0 { DEFAULT_PORT } else { self.port },
            database: self.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            schema: self.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            user: self.user.ok_or("Utente obbligatorio")?,
            secret: self.secret,
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// Connection parameters without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Server hostname or IP
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Schema in the search path
    pub schema: String,
    /// Login user
    pub user: String,
}

impl ProfileSummary {
    /// Get the display connection string.
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Check that a name can be used as an unquoted-safe SQL identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
