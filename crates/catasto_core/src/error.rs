//! Error types for the Catasto client.
//!
//! Every failure a command can produce is a [`CatastoError`]. The controller
//! turns them into `Outcome::Failure` values; only [`CatastoError::Driver`]
//! ends the process.

use thiserror::Error;

/// Main error type for the Catasto client.
#[derive(Debug, Error)]
pub enum CatastoError {
    /// Database host unreachable or connection dropped.
    #[error("Errore di connessione: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication rejected by the server.
    #[error("Autenticazione fallita: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// The schema scope statement failed after connecting.
    #[error("Impossibile usare lo schema '{schema}': {message}")]
    SchemaScope {
        /// Schema that was requested.
        schema: String,
        /// Server message.
        message: String,
    },

    /// A command that needs a live session ran without one.
    #[error("Non sei connesso al database")]
    NotConnected,

    /// The selected command is not in the registry.
    #[error("Comando non riconosciuto: {id}")]
    UnknownCommand {
        /// Identifier or raw selection that did not match.
        id: String,
    },

    /// User input could not be parsed into the expected form.
    #[error("Valore non valido per {field}: {message}")]
    InputFormat {
        /// Name of the offending input.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Failure reported by a query or stored routine.
    #[error("{message}")]
    Collaborator {
        /// Server message, passed through verbatim.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// PostgreSQL error code (e.g., "23505").
        code: Option<String>,
    },

    /// The database client could not be initialized.
    #[error("Errore del driver del database: {message}")]
    Driver {
        /// Human-readable error message.
        message: String,
    },

    /// Local storage error.
    #[error("Errore dell'archivio locale: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CatastoError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            hint: Some("Controlla nome utente e password".to_string()),
        }
    }

    /// Create a schema scope error.
    pub fn schema_scope(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaScope { schema: schema.into(), message: message.into() }
    }

    /// Create an unknown command error.
    pub fn unknown_command(id: impl Into<String>) -> Self {
        Self::UnknownCommand { id: id.into() }
    }

    /// Create an input format error.
    pub fn input_format(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InputFormat { field: field.into(), message: message.into() }
    }

    /// Create a collaborator error carrying only a message.
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator { message: message.into(), detail: None, hint: None, code: None }
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver { message: message.into() }
    }

    /// Create a new storage error.
    pub fn storage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Storage { message: message.into(), hint: hint.map(String::from), source: None }
    }

    // ========== Methods ==========

    /// Whether this error belongs to the connection class (retry by reconnecting).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Authentication { .. } | Self::SchemaScope { .. }
        )
    }

    /// Whether this error came from bad user input.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InputFormat { .. })
    }

    /// Convert a handler failure into the form surfaced by dispatch.
    ///
    /// Input errors and collaborator errors pass unchanged; anything else is
    /// flattened into a collaborator error with its display text.
    pub fn into_command_failure(self) -> Self {
        match self {
            Self::InputFormat { .. } | Self::Collaborator { .. } | Self::NotConnected => self,
            other => Self::collaborator(other.to_string()),
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::SchemaScope { .. } => "Schema",
            Self::NotConnected => "Session",
            Self::UnknownCommand { .. } => "Command",
            Self::InputFormat { .. } => "Input",
            Self::Collaborator { .. } => "Database",
            Self::Driver { .. } => "Driver",
            Self::Storage { .. } => "Storage",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Verifica che il server del database sia in esecuzione"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::SchemaScope { .. } => Some("Verifica che lo schema esista e sia accessibile"),
            Self::NotConnected => Some("Connettiti prima al database"),
            Self::UnknownCommand { .. } => Some("Scegli una delle opzioni elencate"),
            Self::InputFormat { .. } => None,
            Self::Collaborator { hint, .. } => hint.as_deref(),
            Self::Driver { .. } => None,
            Self::Storage { hint, .. } => hint.as_deref(),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Collaborator { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Collaborator { detail, code, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Codice: {code}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Dettaglio: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail (SQLSTATE, server detail).
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to CatastoError.
impl From<tokio_postgres::Error> for CatastoError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let code_str = db_err.code().code();

            return match code_str {
                "28P01" => CatastoError::Authentication {
                    message,
                    hint: Some("Password non valida, controlla le credenziali".to_string()),
                },
                "28000" => CatastoError::Authentication {
                    message,
                    hint: Some("Accesso negato, controlla utente e permessi".to_string()),
                },
                _ if code_str.starts_with("08") => {
                    CatastoError::Connection { message, source: Some(Box::new(err)) }
                }
                _ => CatastoError::Collaborator {
                    message,
                    detail,
                    hint,
                    code: Some(code_str.to_string()),
                },
            };
        }

        if err.is_closed() {
            return CatastoError::Connection {
                message: "Connessione chiusa".to_string(),
                source: Some(Box::new(err)),
            };
        }

        CatastoError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from rusqlite::Error to CatastoError.
impl From<rusqlite::Error> for CatastoError {
    fn from(err: rusqlite::Error) -> Self {
        CatastoError::Storage {
            message: err.to_string(),
            hint: Some("Il database delle impostazioni locali potrebbe essere danneggiato".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from std::io::Error to CatastoError.
impl From<std::io::Error> for CatastoError {
    fn from(err: std::io::Error) -> Self {
        CatastoError::Storage {
            message: err.to_string(),
            hint: Some("Controlla i permessi dei file e lo spazio su disco".to_string()),
            source: Some(Box::new(err)),
        }
    }
}
