//! Versioned archive models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How an archive build selects documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveMode {
    /// Every document, new major version.
    Full,
    /// Only never-archived documents, new minor version.
    Add,
}

impl ArchiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Add => "add",
        }
    }
}

/// Payload compression of an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Xz,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "xz" => Some(Self::Xz),
            "zstd" | "zst" => Some(Self::Zstd),
            _ => None,
        }
    }

    /// File extension for exported payloads.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xz => "xz",
            Self::Zstd => "zst",
        }
    }
}

/// A `major.minor` archive version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveVersion {
    pub major: u32,
    pub minor: u32,
}

impl ArchiveVersion {
    pub const INITIAL: ArchiveVersion = ArchiveVersion { major: 1, minor: 0 };

    /// Version following `previous` for the given build mode.
    pub fn next(previous: Option<&ArchiveVersion>, mode: ArchiveMode) -> Self {
        match (previous, mode) {
            (None, _) => Self::INITIAL,
            (Some(v), ArchiveMode::Full) => Self {
                major: v.major + 1,
                minor: 0,
            },
            (Some(v), ArchiveMode::Add) => Self {
                major: v.major,
                minor: v.minor + 1,
            },
        }
    }
}

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ArchiveVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// A stored archive including its payload.
#[derive(Debug, Clone)]
pub struct Archive {
    pub rowid: i64,
    pub version: ArchiveVersion,
    pub ids: Vec<String>,
    pub note: Option<String>,
    pub archive_date: DateTime<Utc>,
    pub compression: Compression,
    pub payload: Vec<u8>,
}

/// Archive listing entry without the payload.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub version: ArchiveVersion,
    pub documents: usize,
    pub note: Option<String>,
    pub archive_date: DateTime<Utc>,
    pub compression: Compression,
    pub size: u64,
}

/// Archive row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewArchive {
    pub version: ArchiveVersion,
    pub ids: Vec<String>,
    pub note: Option<String>,
    pub compression: Compression,
    pub payload: Vec<u8>,
}
