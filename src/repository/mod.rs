//! Repository layer for SQLite persistence.
//!
//! `CorpusRepository` owns the database path and opens a fresh connection per
//! operation. Its implementation is split by table:
//! - `schema`: table creation and schema version
//! - `raw`: collected records
//! - `vert`: vertical text and synthesized attributes
//! - `lang`: per-record language distributions
//! - `archive`: versioned archive payloads

mod archive;
mod lang;
mod raw;
mod schema;
mod vert;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub use crate::error::Result;
pub use schema::SCHEMA_VERSION;

/// Open a database connection with proper concurrency settings.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Extension trait to convert rusqlite errors for missing rows to Option.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// SQLite-backed corpus repository.
#[derive(Debug, Clone)]
pub struct CorpusRepository {
    db_path: PathBuf,
}

impl CorpusRepository {
    /// Open (and create if needed) the corpus database.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }
}
