//! Library error types.

use thiserror::Error;

/// Errors raised by the corpus pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A multi-valued attribute already contains the join separator and no
    /// replacement is configured.
    #[error("Attribute '{key}' of document {id} contains the separator {separator:?}")]
    Separator {
        id: String,
        key: String,
        separator: String,
    },

    #[error("Malformed CoNLL-U at line {line}: {message}")]
    Conllu { line: usize, message: String },

    #[error("Invalid archive version: {0:?}")]
    InvalidVersion(String),

    #[error("Archive version changed during build (expected {expected:?}, found {found:?})")]
    VersionConflict {
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("No generation index in file name: {0}")]
    FileName(String),

    #[error("Verification failed: {0}")]
    Verify(String),

    #[error("Worker for partition {partition} failed: {message}")]
    Worker { partition: String, message: String },

    #[error("Worker for partition {0} timed out")]
    WorkerTimeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Annotator error: {0}")]
    Annotator(String),
}

pub type Result<T> = std::result::Result<T, Error>;
