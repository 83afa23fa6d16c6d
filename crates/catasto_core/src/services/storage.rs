//! Local SQLite storage for connection defaults.
//!
//! Remembers the parameters of recent successful logins so the console can
//! offer them as prompt defaults. Passwords are never written here.
//!
//! # Data Directory Locations
//!
//! - **macOS**: `~/Library/Application Support/org.catasto.Catasto`
//! - **Windows**: `%APPDATA%\catasto\Catasto`
//! - **Linux**: `~/.local/share/catasto`
//! - **Debug builds**: `./catasto_data` in current directory

use crate::error::CatastoError;
use crate::models::ProfileSummary;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Get the default data directory for the application.
///
/// Debug builds use `./catasto_data` in the current directory.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./catasto_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| {
                #[cfg(target_os = "macos")]
                {
                    d.join("org.catasto.Catasto")
                }
                #[cfg(target_os = "windows")]
                {
                    d.join("catasto").join("Catasto")
                }
                #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                {
                    d.join("catasto")
                }
            })
            .unwrap_or_else(|| PathBuf::from("./catasto_data"))
    }
}

/// Initialize the data directory, creating it if needed.
pub fn init_data_dir(path: &Path) -> Result<(), CatastoError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(CatastoError::storage(
                format!("Il percorso dei dati esiste ma non è una directory: {}", path.display()),
                Some("Indica un'altra --data-dir o rimuovi il file esistente"),
            ));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        CatastoError::storage(
            format!("Impossibile creare la directory dei dati '{}': {}", path.display(), e),
            Some("Controlla i permessi o indica un'altra --data-dir"),
        )
    })?;

    tracing::info!(path = %path.display(), "Created data directory");
    Ok(())
}

/// A remembered login.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentConnection {
    /// Connection parameters, without password
    pub profile: ProfileSummary,
    /// When the login last succeeded
    pub last_used_at: DateTime<Utc>,
}

/// SQLite-based local storage.
pub struct LocalStorage {
    connection: Mutex<Connection>,
    data_dir: PathBuf,
}

impl LocalStorage {
    /// Open or create local storage in the given data directory.
    pub fn open(data_dir: PathBuf) -> Result<Self, CatastoError> {
        init_data_dir(&data_dir)?;
        let db_path = data_dir.join("catasto.db");
        Self::open_with_path(db_path, data_dir)
    }

    /// Open storage with a specific database path.
    pub fn open_with_path(db_path: PathBuf, data_dir: PathBuf) -> Result<Self, CatastoError> {
        let connection = Connection::open(&db_path).map_err(|e| {
            CatastoError::storage(
                format!("Impossibile aprire il database '{}': {}", db_path.display(), e),
                Some("Il file potrebbe essere danneggiato, eliminalo per ricominciare."),
            )
        })?;

        connection
            .execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
            .map_err(|e| CatastoError::storage(format!("Impossibile configurare il database: {e}"), None))?;

        let storage = Self { connection: Mutex::new(connection), data_dir };
        storage.run_migrations()?;

        tracing::info!(path = %db_path.display(), "Local storage opened");
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<(), CatastoError> {
        const DOMAIN: &str = "core";
        let conn = self.connection.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                domain TEXT NOT NULL,
                step INTEGER NOT NULL,
                migration TEXT NOT NULL,
                PRIMARY KEY(domain, step)
            ) STRICT",
            [],
        )
        .map_err(|e| CatastoError::storage(format!("Impossibile creare la tabella delle migrazioni: {e}"), None))?;

        let current_step: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(step), 0) FROM migrations WHERE domain = ?",
                [DOMAIN],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_step < 1 {
            conn.execute_batch(
                "
                CREATE TABLE recent_connections (
                    host TEXT NOT NULL,
                    port INTEGER NOT NULL,
                    database_name TEXT NOT NULL,
                    schema_name TEXT NOT NULL,
                    username TEXT NOT NULL,
                    last_used_at TEXT NOT NULL,
                    PRIMARY KEY(host, port, database_name, schema_name, username)
                ) STRICT;

                CREATE INDEX idx_recent_connections_used ON recent_connections(last_used_at DESC);
                ",
            )
            .map_err(|e| CatastoError::storage(format!("Migrazione 1 fallita: {e}"), None))?;

            conn.execute(
                "INSERT INTO migrations (domain, step, migration) VALUES (?, 1, 'recent_connections')",
                [DOMAIN],
            )
            .map_err(|e| CatastoError::storage(format!("Impossibile registrare la migrazione: {e}"), None))?;

            tracing::info!("Applied migration 1: recent_connections");
        }

        Ok(())
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Record a successful login, refreshing its timestamp if already known.
    pub fn remember_connection(&self, profile: &ProfileSummary) -> Result<(), CatastoError> {
        self.remember_connection_at(profile, Utc::now())
    }

    fn remember_connection_at(
        &self,
        profile: &ProfileSummary,
        used_at: DateTime<Utc>,
    ) -> Result<(), CatastoError> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO recent_connections (
                host, port, database_name, schema_name, username, last_used_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(host, port, database_name, schema_name, username) DO UPDATE SET
                last_used_at = excluded.last_used_at",
            params![
                profile.host,
                profile.port,
                profile.database,
                profile.schema,
                profile.user,
                used_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(|e| CatastoError::storage(format!("Impossibile memorizzare l'accesso: {e}"), None))?;

        tracing::debug!(url = %profile.display_url(), "Connection remembered");
        Ok(())
    }

    /// Most recently used login, if any.
    pub fn last_connection(&self) -> Result<Option<ProfileSummary>, CatastoError> {
        Ok(self.recent_connections(1)?.into_iter().next().map(|recent| recent.profile))
    }

    /// Remembered logins, most recent first.
    pub fn recent_connections(&self, limit: usize) -> Result<Vec<RecentConnection>, CatastoError> {
        let conn = self.connection.lock();
        let mut stmt = conn
            .prepare(
                "SELECT host, port, database_name, schema_name, username, last_used_at
                 FROM recent_connections
                 ORDER BY last_used_at DESC
                 LIMIT ?1",
            )
            .map_err(|e| CatastoError::storage(format!("Impossibile preparare la query: {e}"), None))?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    ProfileSummary {
                        host: row.get(0)?,
                        port: row.get(1)?,
                        database: row.get(2)?,
                        schema: row.get(3)?,
                        user: row.get(4)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| CatastoError::storage(format!("Impossibile leggere gli accessi: {e}"), None))?;

        let mut recent = Vec::new();
        for row in rows {
            let (profile, used_at) =
                row.map_err(|e| CatastoError::storage(format!("Impossibile leggere la riga: {e}"), None))?;
            let last_used_at = DateTime::parse_from_rfc3339(&used_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| CatastoError::storage(format!("Data non valida: {e}"), None))?;
            recent.push(RecentConnection { profile, last_used_at });
        }
        Ok(recent)
    }

    /// Forget a remembered login. Returns whether it was known.
    pub fn forget_connection(&self, profile: &ProfileSummary) -> Result<bool, CatastoError> {
        let conn = self.connection.lock();
        let removed = conn
            .execute(
                "DELETE FROM recent_connections
                 WHERE host = ?1 AND port = ?2 AND database_name = ?3
                   AND schema_name = ?4 AND username = ?5",
                params![profile.host, profile.port, profile.database, profile.schema, profile.user],
            )
            .map_err(|e| CatastoError::storage(format!("Impossibile dimenticare l'accesso: {e}"), None))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn summary(host: &str, user: &str) -> ProfileSummary {
        ProfileSummary {
            host: host.to_string(),
            port: 5432,
            database: "catasto_storico".to_string(),
            schema: "catasto".to_string(),
            user: user.to_string(),
        }
    }

    fn open() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path().join("data")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_open_creates_data_dir() {
        let (dir, storage) = open();
        assert!(dir.path().join("data").is_dir());
        assert!(storage.data_dir().join("catasto.db").exists());
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        {
            let storage = LocalStorage::open(data_dir.clone()).unwrap();
            storage.remember_connection(&summary("db.local", "postgres")).unwrap();
        }
        let storage = LocalStorage::open(data_dir).unwrap();
        assert_eq!(storage.last_connection().unwrap(), Some(summary("db.local", "postgres")));
    }

    #[test]
    fn test_last_connection_is_most_recent() {
        let (_dir, storage) = open();
        assert_eq!(storage.last_connection().unwrap(), None);

        let now = Utc::now();
        storage.remember_connection_at(&summary("a", "postgres"), now - Duration::hours(2)).unwrap();
        storage.remember_connection_at(&summary("b", "archivista"), now - Duration::hours(1)).unwrap();
        assert_eq!(storage.last_connection().unwrap(), Some(summary("b", "archivista")));

        storage.remember_connection_at(&summary("a", "postgres"), now).unwrap();
        let recent = storage.recent_connections(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].profile, summary("a", "postgres"));
    }

    #[test]
    fn test_recent_connections_limit() {
        let (_dir, storage) = open();
        for host in ["a", "b", "c"] {
            storage.remember_connection(&summary(host, "postgres")).unwrap();
        }
        assert_eq!(storage.recent_connections(2).unwrap().len(), 2);
    }

    #[test]
    fn test_forget_connection() {
        let (_dir, storage) = open();
        let profile = summary("db.local", "postgres");
        storage.remember_connection(&profile).unwrap();
        assert_eq!(storage.recent_connections(10).unwrap().len(), 1);
        assert!(storage.forget_connection(&profile).unwrap());
        assert!(!storage.forget_connection(&profile).unwrap());
        assert_eq!(storage.last_connection().unwrap(), None);
    }

    #[test]
    fn test_data_path_that_is_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        let err = init_data_dir(&file).unwrap_err();
        assert_eq!(err.category(), "Storage");
    }
}
