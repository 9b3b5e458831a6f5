//! Raw records as handed over by the upstream collector.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One source document with its arbitrary nested fields.
///
/// The long text to annotate lives inside `fields` under a configurable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
    /// Last modification reported by the source.
    pub changed: DateTime<Utc>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>, changed: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            fields,
            changed,
        }
    }

    /// Parse one JSON-lines import object.
    ///
    /// `id` may be a string or a number and is removed from the fields. A
    /// `changed` string (RFC 3339) sets the modification time and stays in the
    /// fields; without it the Unix epoch is used, so re-imports compare equal.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::Config("record is not a JSON object".to_string()));
        };

        let id = match fields.remove("id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(Error::Config("record has no usable 'id'".to_string())),
        };

        let changed = fields
            .get("changed")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Ok(Self {
            id,
            fields,
            changed,
        })
    }

    /// The text to annotate, if present and a string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Per-record language portions from a language identification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDistribution {
    pub id: String,
    pub lid: BTreeMap<String, f64>,
}

/// Records chosen for a plain-text export.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSelection {
    pub language: String,
    /// Minimum portion of the text in `language`.
    pub min_portion: f64,
    /// Dotted path of the record date inside the fields, e.g. `date.original`.
    /// Records without it fall back to `changed`.
    pub date_field: String,
    /// Inclusive date window.
    pub start: NaiveDate,
    pub end: NaiveDate,
}
