//! Attribute synthesis: one record's fields to a `<doc ...>` start tag.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::batch::{BatchCursor, Flow};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{flatten_fields, AttrValue, AttributeBag, AttributeSchema, DocumentRow, Multiplicity};
use crate::repository::CorpusRepository;
use crate::utils::text::normalize_text;
use crate::utils::xml::{escape_attr, is_xml_invalid};
use crate::utils::FanOut;

/// Parse the year of an RFC 3339 timestamp or a plain date.
fn parse_year(value: &str) -> Option<i32> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.year());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.year());
    }
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}

/// Normalize, remove XML-invalid characters, collapse whitespace and trim.
pub fn clean_value(value: &str) -> String {
    normalize_text(value)
        .split(|c: char| c.is_whitespace() || is_xml_invalid(c))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct AttributeSynthesizer {
    schema: AttributeSchema,
    text_field: String,
    separator: String,
    replacement: Option<String>,
    year_prefix: String,
}

impl AttributeSynthesizer {
    pub fn new(
        schema: AttributeSchema,
        text_field: &str,
        separator: &str,
        replacement: Option<&str>,
        year_prefix: &str,
    ) -> Self {
        Self {
            schema,
            text_field: text_field.to_string(),
            separator: separator.to_string(),
            replacement: replacement.map(str::to_string),
            year_prefix: year_prefix.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.attributes.schema(),
            &config.text_field,
            &config.attributes.separator,
            config.attributes.replacement.as_deref(),
            &config.attributes.year_prefix,
        )
    }

    fn is_year_key(&self, key: &str) -> bool {
        key.starts_with(&self.year_prefix) && key.ends_with("__year")
    }

    /// Flatten fields, remove the text field and dropped keys, then derive
    /// `<date>__year` values from what is left.
    pub fn flatten(&self, id: &str, fields: &Map<String, Value>) -> AttributeBag {
        let mut bag = flatten_fields(fields);
        bag.remove(&self.text_field);
        bag.remove("id");
        bag.retain(|key, _| !self.schema.is_dropped(key));

        let date_keys: Vec<String> = bag
            .keys()
            .filter(|k| k.starts_with(&self.year_prefix) && !self.is_year_key(k))
            .cloned()
            .collect();

        for key in date_keys {
            let values: Vec<&String> = match &bag[&key] {
                AttrValue::Scalar(s) => vec![s],
                AttrValue::List(items) => items.iter().collect(),
                AttrValue::Null => continue,
            };
            let mut years = Vec::new();
            for value in values {
                match parse_year(value) {
                    Some(year) => years.push(year.to_string()),
                    None => warn!(id, key = %key, value = %value, "Unparsable date"),
                }
            }
            let derived = match years.len() {
                0 => continue,
                1 => AttrValue::Scalar(years.remove(0)),
                _ => AttrValue::List(years),
            };
            bag.insert(format!("{}__year", key), derived);
        }
        bag
    }

    fn check_separator(&self, id: &str, key: &str, value: String) -> Result<String> {
        if !value.contains(&self.separator) {
            return Ok(value);
        }
        match &self.replacement {
            Some(replacement) => {
                warn!(id, key, "Replacing separator {:?} in value", self.separator);
                Ok(value.replace(&self.separator, replacement))
            }
            None => Err(Error::Separator {
                id: id.to_string(),
                key: key.to_string(),
                separator: self.separator.clone(),
            }),
        }
    }

    fn render_value(&self, id: &str, key: &str, value: &AttrValue, multiplicity: Multiplicity) -> Result<Option<String>> {
        let items: Vec<String> = match value {
            AttrValue::Null => return Ok(None),
            AttrValue::Scalar(s) => vec![clean_value(s)],
            AttrValue::List(items) => items.iter().map(|s| clean_value(s)).collect(),
        };
        let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
        if items.is_empty() {
            return Ok(None);
        }

        let joined = match multiplicity {
            Multiplicity::Multi => items
                .into_iter()
                .map(|item| self.check_separator(id, key, item))
                .collect::<Result<Vec<_>>>()?
                .join(&self.separator),
            Multiplicity::Single => items.join(", "),
        };
        Ok(Some(joined))
    }

    /// Render a bag as `<doc id="..." k="v" ... >`, collecting unknown keys.
    pub fn render(&self, id: &str, bag: &AttributeBag, missing: &mut BTreeSet<String>) -> Result<String> {
        let mut out = format!("<doc id=\"{}\" ", escape_attr(id));
        for (key, value) in bag {
            if key == "id" || self.schema.is_dropped(key) {
                continue;
            }
            let multiplicity = if self.schema.is_known(key) {
                self.schema.multiplicity(key)
            } else if self.is_year_key(key) {
                Multiplicity::Single
            } else {
                missing.insert(key.clone());
                Multiplicity::Multi
            };
            if let Some(value) = self.render_value(id, key, value, multiplicity)? {
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_attr(&value));
                out.push_str("\" ");
            }
        }
        out.push('>');
        Ok(out)
    }

    pub fn synthesize_with(&self, id: &str, fields: &Map<String, Value>, missing: &mut BTreeSet<String>) -> Result<String> {
        let bag = self.flatten(id, fields);
        self.render(id, &bag, missing)
    }

    pub fn synthesize(&self, id: &str, fields: &Map<String, Value>) -> Result<String> {
        self.synthesize_with(id, fields, &mut BTreeSet::new())
    }

    /// Attribute tag for a stored document row.
    pub fn synthesize_row(&self, row: &DocumentRow, missing: &mut BTreeSet<String>) -> Result<String> {
        match &row.fields {
            Some(fields) => self.synthesize_with(&row.id, fields, missing),
            None => {
                warn!(id = %row.id, "Raw record missing, emitting id only");
                self.synthesize_with(&row.id, &Map::new(), missing)
            }
        }
    }
}

#[derive(Debug, Default)]
struct AttributeState {
    written: u64,
    skipped: u64,
    missing: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeSummary {
    pub written: u64,
    pub skipped: u64,
    pub failed_partitions: Vec<String>,
    pub missing: BTreeSet<String>,
}

fn log_missing(missing: &BTreeSet<String>) {
    if !missing.is_empty() {
        warn!(keys = ?missing, "Attributes missing from schema, treated as multi-valued");
    }
}

/// Fills `vert.attr` for documents that have none (or all, with `overwrite`).
pub struct AttributeJob<'a> {
    repo: &'a CorpusRepository,
    synthesizer: &'a AttributeSynthesizer,
    overwrite: bool,
}

impl<'a> AttributeJob<'a> {
    pub fn new(repo: &'a CorpusRepository, synthesizer: &'a AttributeSynthesizer, overwrite: bool) -> Self {
        Self {
            repo,
            synthesizer,
            overwrite,
        }
    }

    pub fn run(&self, cursor: &BatchCursor) -> Result<AttributeSummary> {
        let mut state = AttributeState::default();
        cursor.drive(&mut state, |state, ctx| {
            let page = cursor.fetch(ctx.run, |limit, offset| self.repo.document_page(limit, offset))?;
            if page.is_empty() {
                return Ok(Flow::Stop);
            }

            let mut attrs = Vec::new();
            for row in &page.rows {
                if row.attr.is_some() && !self.overwrite {
                    state.skipped += 1;
                    continue;
                }
                let attr = self.synthesizer.synthesize_row(row, &mut state.missing)?;
                attrs.push((row.id.clone(), attr));
            }
            state.written += self.repo.set_attrs(&attrs)? as u64;
            Ok(Flow::Continue)
        })?;

        log_missing(&state.missing);
        info!(written = state.written, skipped = state.skipped, "Attribute pass done");
        Ok(AttributeSummary {
            written: state.written,
            skipped: state.skipped,
            failed_partitions: Vec::new(),
            missing: state.missing,
        })
    }
}

/// Attributes computed by one worker partition.
struct PartitionAttrs {
    attrs: Vec<(String, String)>,
    skipped: u64,
    missing: BTreeSet<String>,
}

/// Partitioned attribute pass: one worker per record year, each on its own
/// connection. Results are written sequentially by the caller's task.
pub async fn run_partitioned(
    db_path: PathBuf,
    synthesizer: Arc<AttributeSynthesizer>,
    overwrite: bool,
    fanout: &FanOut,
) -> Result<AttributeSummary> {
    let repo = CorpusRepository::new(&db_path)?;
    let partitions: Vec<(String, String)> = repo
        .document_years()?
        .into_iter()
        .map(|year| (format!("year {}", year), year))
        .collect();
    info!("Synthesizing attributes over {} partitions", partitions.len());

    let worker_db = db_path.clone();
    let outcomes = fanout
        .run(partitions, move |year: String| {
            let repo = CorpusRepository::new(&worker_db)?;
            let mut result = PartitionAttrs {
                attrs: Vec::new(),
                skipped: 0,
                missing: BTreeSet::new(),
            };
            for row in repo.documents_for_year(&year)? {
                if row.attr.is_some() && !overwrite {
                    result.skipped += 1;
                    continue;
                }
                let attr = synthesizer.synthesize_row(&row, &mut result.missing)?;
                result.attrs.push((row.id, attr));
            }
            debug!(year = %year, documents = result.attrs.len(), "Partition synthesized");
            Ok(result)
        })
        .await;

    let mut summary = AttributeSummary::default();
    for outcome in outcomes {
        match outcome.result {
            Ok(part) => {
                summary.written += repo.set_attrs(&part.attrs)? as u64;
                summary.skipped += part.skipped;
                summary.missing.extend(part.missing);
            }
            Err(_) => summary.failed_partitions.push(outcome.partition),
        }
    }

    log_missing(&summary.missing);
    info!(
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed_partitions.len(),
        "Partitioned attribute pass done"
    );
    Ok(summary)
}
