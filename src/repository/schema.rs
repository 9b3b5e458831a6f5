//! Database schema initialization.

use tracing::info;

use super::{CorpusRepository, Result};

/// Schema version stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

impl CorpusRepository {
    pub(crate) fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        conn.execute_batch(
            r#"
            -- Records from the upstream collector
            CREATE TABLE IF NOT EXISTS raw (
                id TEXT PRIMARY KEY,
                fields TEXT NOT NULL,
                changed TEXT NOT NULL
            );

            -- One vertical document per record
            CREATE TABLE IF NOT EXISTS vert (
                id TEXT PRIMARY KEY REFERENCES raw(id),
                vertical_text TEXT NOT NULL,
                vert_date TEXT NOT NULL,
                attr TEXT
            );

            -- Language portions per record
            CREATE TABLE IF NOT EXISTS lang (
                id TEXT PRIMARY KEY,
                lid TEXT NOT NULL
            );

            -- Versioned, compressed document sets
            CREATE TABLE IF NOT EXISTS archive (
                version TEXT NOT NULL UNIQUE,
                ids TEXT NOT NULL,
                note TEXT,
                archive_date TEXT NOT NULL,
                compression TEXT NOT NULL DEFAULT 'xz',
                payload BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_raw_changed ON raw(changed);
            CREATE INDEX IF NOT EXISTS idx_archive_date ON archive(archive_date);
        "#,
        )?;

        if current < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
            info!("Initialized corpus schema version {}", SCHEMA_VERSION);
        }
        Ok(())
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.connect()?;
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }
}
