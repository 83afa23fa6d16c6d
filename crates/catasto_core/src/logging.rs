//! Structured logging setup.
//!
//! Log records go to a daily rotating file under the data directory. On an
//! interactive terminal only warnings reach stderr so they do not break up
//! the menus; otherwise stderr gets everything from INFO up. If the file
//! cannot be created, logging falls back to the console alone.
//!
//! The filter comes from, in order: an explicit filter, `CATASTO_LOG`,
//! `RUST_LOG`, then a build-dependent default.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is an interactive terminal
    pub is_tty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_tty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the process.
///
/// Dropping it flushes pending log entries.
pub struct LoggingGuard {
    worker_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether records are also written to a file.
    pub fn has_file_sink(&self) -> bool {
        self.worker_guard.is_some()
    }
}

/// Initialize logging with the given configuration.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_console_logging(&config)
        }
    }
}

/// Initialize with defaults.
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn console_level(is_tty: bool) -> tracing::Level {
    if is_tty {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    }
}

fn init_console_logging(config: &LogConfig) -> LoggingGuard {
    let stderr = std::io::stderr.with_max_level(console_level(config.is_tty));

    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = tracing_subscriber::fmt()
        .with_writer(stderr)
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(config.is_tty)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();

    LoggingGuard { worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("catasto")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr = std::io::stderr.with_max_level(console_level(config.is_tty));
    let combined = stderr.and(non_blocking);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| e.to_string())?;

    Ok(guard)
}

fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env("CATASTO_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,catasto=trace,catasto_core=trace,tokio_postgres=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,catasto=info,catasto_core=info,tokio_postgres=warn"
    }
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    crate::services::storage::default_data_dir().join("logs")
}
