//! Annotated tokens and vertical-format documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One annotated token as produced by the external annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Surface form.
    pub form: String,
    /// Coarse part-of-speech tag.
    pub tag: String,
    #[serde(default)]
    pub lemma: Option<String>,
}

impl Token {
    pub fn new(form: &str, tag: &str, lemma: Option<&str>) -> Self {
        Self {
            form: form.to_string(),
            tag: tag.to_string(),
            lemma: lemma.map(str::to_string),
        }
    }
}

pub type Sentence = Vec<Token>;

/// Vertical text for one record, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedDocument {
    pub id: String,
    /// Sentence blocks without the enclosing document tags.
    pub vertical_text: String,
    pub vert_date: DateTime<Utc>,
    /// Synthesized document start tag, filled by a later pass.
    pub attr: Option<String>,
}

impl AnnotatedDocument {
    /// Returns `None` for empty text; empty documents are never stored.
    pub fn new(id: impl Into<String>, vertical_text: String) -> Option<Self> {
        if vertical_text.trim().is_empty() {
            return None;
        }
        Some(Self {
            id: id.into(),
            vertical_text,
            vert_date: Utc::now(),
            attr: None,
        })
    }
}

/// A stored vertical joined with its raw record.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub vertical_text: String,
    pub attr: Option<String>,
    /// `None` when the raw record is gone.
    pub fields: Option<Map<String, Value>>,
    pub changed: Option<DateTime<Utc>>,
}

/// Wrap a sentence block into a complete document.
pub fn join_document(attr: &str, vertical_text: &str) -> String {
    let mut doc = String::with_capacity(attr.len() + vertical_text.len() + 8);
    doc.push_str(attr);
    doc.push('\n');
    doc.push_str(vertical_text);
    if !vertical_text.ends_with('\n') {
        doc.push('\n');
    }
    doc.push_str("</doc>\n");
    doc
}
