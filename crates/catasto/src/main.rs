//! Catasto Storico - console client for the historical land registry.

mod console;
mod render;

use catasto_core::logging::{init_logging, LogConfig};
use catasto_core::models::ProfileSummary;
use catasto_core::services::default_data_dir;
use catasto_core::{
    CatastoError, ConnectionOptions, LocalStorage, PostgresCollaborator, Session,
    SessionController,
};
use clap::Parser;
use console::Console;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Console client for the Catasto Storico database.
#[derive(Parser, Debug)]
#[command(name = "catasto", version, about)]
struct Cli {
    /// Default database host offered at login
    #[arg(long)]
    host: Option<String>,

    /// Default database port offered at login
    #[arg(long)]
    port: Option<u16>,

    /// Default database name offered at login
    #[arg(long)]
    database: Option<String>,

    /// Default schema offered at login
    #[arg(long)]
    schema: Option<String>,

    /// Default user offered at login
    #[arg(long)]
    user: Option<String>,

    /// Connection timeout in seconds (driver default when unset)
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u32>,

    /// Statement timeout in seconds (server default when unset)
    #[arg(long, value_name = "SECS")]
    statement_timeout: Option<u32>,

    /// Log filter, e.g. "info,catasto_core=debug"
    #[arg(long)]
    log_filter: Option<String>,

    /// Directory for logs and local settings
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Do not store the parameters of successful logins
    #[arg(long)]
    no_remember: bool,

    /// List remembered logins and exit
    #[arg(long, conflicts_with = "forget")]
    recent: bool,

    /// Forget the most recent remembered login and exit
    #[arg(long)]
    forget: bool,
}

/// Logins listed by `--recent`.
const RECENT_LIMIT: usize = 10;

fn list_recent(storage: &LocalStorage, out: &mut impl Write) -> Result<(), CatastoError> {
    let recent = storage.recent_connections(RECENT_LIMIT)?;
    if recent.is_empty() {
        writeln!(out, "Nessun accesso memorizzato.")?;
        return Ok(());
    }
    for login in recent {
        writeln!(
            out,
            "{}  {} (schema {})",
            login.last_used_at.format("%Y-%m-%d %H:%M"),
            login.profile.display_url(),
            login.profile.schema
        )?;
    }
    Ok(())
}

fn forget_last(storage: &LocalStorage, out: &mut impl Write) -> Result<(), CatastoError> {
    match storage.last_connection()? {
        Some(last) => {
            storage.forget_connection(&last)?;
            writeln!(out, "Accesso dimenticato: {} (schema {})", last.display_url(), last.schema)?;
        }
        None => writeln!(out, "Nessun accesso memorizzato.")?,
    }
    Ok(())
}

/// Login prompt defaults: flags first, then the last remembered login.
fn prompt_defaults(
    cli: &Cli,
    last: Option<ProfileSummary>,
) -> HashMap<&'static str, String> {
    let mut defaults = HashMap::new();
    if let Some(last) = last {
        defaults.insert("host", last.host);
        defaults.insert("port", last.port.to_string());
        defaults.insert("database", last.database);
        defaults.insert("schema", last.schema);
        defaults.insert("user", last.user);
    }

    let flags = [
        ("host", cli.host.clone()),
        ("port", cli.port.map(|p| p.to_string())),
        ("database", cli.database.clone()),
        ("schema", cli.schema.clone()),
        ("user", cli.user.clone()),
    ];
    for (name, value) in flags {
        if let Some(value) = value {
            defaults.insert(name, value);
        }
    }
    defaults
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    let mut log_config = LogConfig::new(data_dir.join("logs"));
    if let Some(filter) = &cli.log_filter {
        log_config = log_config.with_filter(filter);
    }
    let _logging_guard = init_logging(log_config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Catasto");

    let options = ConnectionOptions {
        connect_timeout_secs: cli.connect_timeout,
        statement_timeout_secs: cli.statement_timeout,
        ..ConnectionOptions::default()
    };
    let storage = match LocalStorage::open(data_dir) {
        Ok(storage) => Some(storage),
        Err(e) => {
            tracing::warn!(error = %e, "Local storage unavailable, logins will not be remembered");
            None
        }
    };

    if cli.recent || cli.forget {
        let Some(storage) = storage else {
            eprintln!("Errore: archivio locale non disponibile");
            return ExitCode::from(1);
        };
        let mut stdout = io::stdout().lock();
        let result = if cli.recent {
            list_recent(&storage, &mut stdout)
        } else {
            forget_last(&storage, &mut stdout)
        };
        return match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Errore: {e}");
                ExitCode::from(1)
            }
        };
    }

    let collaborator = match PostgresCollaborator::new(options) {
        Ok(collaborator) => collaborator,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize database client");
            eprintln!("Errore: {e}");
            return ExitCode::from(1);
        }
    };

    let last = storage.as_ref().and_then(|s| match s.last_connection() {
        Ok(last) => last,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read last connection");
            None
        }
    });

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = Console::new(stdin.lock(), stdout.lock())
        .with_defaults(prompt_defaults(&cli, last))
        .with_storage(storage, !cli.no_remember)
        .with_hidden_secrets(atty::is(atty::Stream::Stdin));

    let controller = SessionController::default();
    let mut session = Session::new(collaborator);
    let code = controller.main_loop(&mut session, &mut console);

    tracing::info!("Catasto finished");
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last() -> ProfileSummary {
        ProfileSummary {
            host: "db.archivio.local".to_string(),
            port: 5433,
            database: "catasto_storico".to_string(),
            schema: "catasto".to_string(),
            user: "archivista".to_string(),
        }
    }

    #[test]
    fn test_flags_override_remembered_login() {
        let cli = Cli::parse_from(["catasto", "--user", "postgres", "--port", "5432"]);
        let defaults = prompt_defaults(&cli, Some(last()));
        assert_eq!(defaults["host"], "db.archivio.local");
        assert_eq!(defaults["user"], "postgres");
        assert_eq!(defaults["port"], "5432");
    }

    #[test]
    fn test_no_defaults_without_flags_or_history() {
        let cli = Cli::parse_from(["catasto"]);
        assert!(prompt_defaults(&cli, None).is_empty());
        assert!(!cli.no_remember);
    }

    #[test]
    fn test_recent_lists_and_forget_removes_last_login() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path().join("data")).unwrap();

        let mut out = Vec::new();
        list_recent(&storage, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Nessun accesso memorizzato.\n");

        storage.remember_connection(&last()).unwrap();
        let mut out = Vec::new();
        list_recent(&storage, &mut out).unwrap();
        let listed = String::from_utf8(out).unwrap();
        assert!(listed.contains("postgresql://archivista@db.archivio.local:5433/catasto_storico"));
        assert!(listed.trim_end().ends_with("(schema catasto)"));

        let mut out = Vec::new();
        forget_last(&storage, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Accesso dimenticato: "));
        assert_eq!(storage.last_connection().unwrap(), None);
    }

    #[test]
    fn test_recent_and_forget_conflict() {
        assert!(Cli::try_parse_from(["catasto", "--recent", "--forget"]).is_err());
        assert!(Cli::parse_from(["catasto", "--recent"]).recent);
    }

    #[test]
    fn test_timeouts_are_optional() {
        let cli = Cli::parse_from(["catasto", "--connect-timeout", "10"]);
        assert_eq!(cli.connect_timeout, Some(10));
        assert_eq!(cli.statement_timeout, None);
    }
}
