//! Forward vertical codec: annotated sentences to vertical text.
//!
//! Token lines are `form\tTAG\tlemma+suffix`; sentences are framed by
//! `<s id="N">` / `</s>` with N restarting at 0 for every document.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::batch::{BatchCursor, Flow};
use crate::config::{Config, TagInfo};
use crate::error::{Error, Result};
use crate::models::{AnnotatedDocument, Record, Sentence, Token};
use crate::repository::CorpusRepository;
use crate::utils::per_second;

static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Tokenizer, tagger and lemmatizer, treated as an opaque function.
pub trait Annotator {
    fn annotate(&self, id: &str, text: &str) -> Result<Vec<Sentence>>;
}

/// Annotator serving annotations computed ahead of time.
///
/// Reads JSON lines of `{"id": "..", "sentences": [[{"form", "tag", "lemma"}]]}`.
#[derive(Debug, Default)]
pub struct PrecomputedAnnotator {
    documents: HashMap<String, Vec<Sentence>>,
}

#[derive(Deserialize)]
struct AnnotationLine {
    id: serde_json::Value,
    sentences: Vec<Sentence>,
}

impl PrecomputedAnnotator {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut documents = HashMap::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: AnnotationLine = serde_json::from_str(&line)
                .map_err(|e| Error::Annotator(format!("line {}: {}", n + 1, e)))?;
            let id = match parsed.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            documents.insert(id, parsed.sentences);
        }
        Ok(Self { documents })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(crate::utils::compress::open_reader(path)?)
    }

    pub fn insert(&mut self, id: impl Into<String>, sentences: Vec<Sentence>) {
        self.documents.insert(id.into(), sentences);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Annotator for PrecomputedAnnotator {
    fn annotate(&self, id: &str, _text: &str) -> Result<Vec<Sentence>> {
        match self.documents.get(id) {
            Some(sentences) => Ok(sentences.clone()),
            None => {
                debug!(id, "No precomputed annotation");
                Ok(Vec::new())
            }
        }
    }
}

/// Encodes annotated sentences into vertical text.
#[derive(Debug, Clone)]
pub struct VerticalCodec {
    tagset: BTreeMap<String, TagInfo>,
    number_tag: String,
    number_placeholder: String,
}

impl VerticalCodec {
    pub fn new(tagset: BTreeMap<String, TagInfo>, number_tag: &str, number_placeholder: &str) -> Self {
        Self {
            tagset,
            number_tag: number_tag.to_string(),
            number_placeholder: number_placeholder.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tagset.clone(),
            &config.number_tag,
            &config.number_placeholder,
        )
    }

    /// Lemma for a token: the surface form when missing, the placeholder for
    /// numbers written with digits.
    pub fn lemma<'a>(&'a self, id: &str, token: &'a Token) -> &'a str {
        let lemma = match token.lemma.as_deref() {
            Some(lemma) if !lemma.is_empty() => lemma,
            _ => {
                warn!(id, form = %token.form, "Missing lemma, using surface form");
                &token.form
            }
        };
        if token.tag == self.number_tag && DIGIT.is_match(lemma) {
            &self.number_placeholder
        } else {
            lemma
        }
    }

    /// Sentence blocks for one document.
    pub fn encode(&self, id: &str, sentences: &[Sentence]) -> String {
        let mut out = String::new();
        let mut unknown = BTreeSet::new();
        let mut n = 0usize;

        for sentence in sentences.iter().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "<s id=\"{}\">", n);
            for token in sentence {
                let suffix = match self.tagset.get(&token.tag) {
                    Some(info) => info.lpos.as_str(),
                    None => {
                        unknown.insert(token.tag.as_str());
                        ""
                    }
                };
                let _ = writeln!(
                    out,
                    "{}\t{}\t{}{}",
                    token.form,
                    token.tag,
                    self.lemma(id, token),
                    suffix
                );
            }
            out.push_str("</s>\n");
            n += 1;
        }

        if !unknown.is_empty() {
            warn!(id, tags = ?unknown, "Tags missing from tagset, no lemma suffix");
        }
        out
    }

    /// Encode a document; `None` when nothing was produced.
    pub fn encode_document(&self, id: &str, sentences: &[Sentence]) -> Option<AnnotatedDocument> {
        AnnotatedDocument::new(id, self.encode(id, sentences))
    }
}

/// Restrict a build to records in one language.
#[derive(Debug, Clone)]
pub struct LanguageFilter {
    pub language: String,
    pub min_portion: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VerticalOptions {
    /// Re-annotate records changed since their vertical was built.
    pub update: bool,
    pub language: Option<LanguageFilter>,
}

/// Per-job counters, threaded through the batch loop.
#[derive(Debug, Default)]
struct VerticalState {
    existing: HashMap<String, DateTime<Utc>>,
    allowed: Option<HashSet<String>>,
    processed: u64,
    skipped: u64,
    filtered: u64,
    dropped: u64,
    tokens: u64,
}

#[derive(Debug, Clone)]
pub struct VerticalSummary {
    pub processed: u64,
    pub skipped: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub tokens: u64,
    pub runs: usize,
    pub next_run: usize,
    pub elapsed: Duration,
}

/// Builds verticals for every record that lacks one.
pub struct VerticalJob<'a, A: Annotator> {
    repo: &'a CorpusRepository,
    codec: &'a VerticalCodec,
    annotator: &'a A,
    text_field: &'a str,
    options: VerticalOptions,
}

impl<'a, A: Annotator> VerticalJob<'a, A> {
    pub fn new(
        repo: &'a CorpusRepository,
        codec: &'a VerticalCodec,
        annotator: &'a A,
        text_field: &'a str,
        options: VerticalOptions,
    ) -> Self {
        Self {
            repo,
            codec,
            annotator,
            text_field,
            options,
        }
    }

    fn wanted(&self, state: &mut VerticalState, record: &Record) -> bool {
        if let Some(allowed) = &state.allowed {
            if !allowed.contains(&record.id) {
                state.filtered += 1;
                return false;
            }
        }
        match state.existing.get(&record.id) {
            None => true,
            Some(vert_date) if self.options.update && record.changed > *vert_date => {
                debug!(id = %record.id, "Record changed since vertical was built");
                true
            }
            Some(_) => {
                state.skipped += 1;
                false
            }
        }
    }

    fn annotate_record(&self, state: &mut VerticalState, record: &Record) -> Result<Option<AnnotatedDocument>> {
        let Some(text) = record
            .text(self.text_field)
            .filter(|t| !t.trim().is_empty())
        else {
            warn!(id = %record.id, field = self.text_field, "Record has no text, skipping");
            state.dropped += 1;
            return Ok(None);
        };

        let sentences = self.annotator.annotate(&record.id, text)?;
        match self.codec.encode_document(&record.id, &sentences) {
            Some(doc) => {
                state.tokens += sentences.iter().map(|s| s.len() as u64).sum::<u64>();
                state.processed += 1;
                Ok(Some(doc))
            }
            None => {
                warn!(id = %record.id, "Empty vertical, dropping");
                state.dropped += 1;
                Ok(None)
            }
        }
    }

    pub fn run(&self, cursor: &BatchCursor) -> Result<VerticalSummary> {
        let mut state = VerticalState {
            existing: self.repo.vert_dates()?,
            ..Default::default()
        };
        if let Some(filter) = &self.options.language {
            let ids = self
                .repo
                .ids_with_language(&filter.language, filter.min_portion)?;
            info!(
                language = %filter.language,
                min_portion = filter.min_portion,
                "Restricting build to {} records",
                ids.len()
            );
            state.allowed = Some(ids);
        }

        let report = cursor.drive(&mut state, |state, ctx| {
            let page = cursor.fetch(ctx.run, |limit, offset| self.repo.raw_page(limit, offset))?;
            if page.is_empty() {
                return Ok(Flow::Stop);
            }

            let mut docs = Vec::new();
            for record in &page.rows {
                if !self.wanted(state, record) {
                    continue;
                }
                if let Some(doc) = self.annotate_record(state, record)? {
                    docs.push(doc);
                }
            }

            if !docs.is_empty() {
                self.repo.upsert_verticals(&docs)?;
                for doc in &docs {
                    state.existing.insert(doc.id.clone(), doc.vert_date);
                }
            }
            debug!(run = ctx.run, offset = page.offset, stored = docs.len(), "Run committed");
            Ok(Flow::Continue)
        })?;

        let summary = VerticalSummary {
            processed: state.processed,
            skipped: state.skipped,
            filtered: state.filtered,
            dropped: state.dropped,
            tokens: state.tokens,
            runs: report.runs,
            next_run: report.next_run,
            elapsed: report.elapsed,
        };
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            dropped = summary.dropped,
            "Vertical build done, {:.0} tokens/s",
            per_second(summary.tokens, summary.elapsed)
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{body, repo};

    fn codec() -> VerticalCodec {
        VerticalCodec::from_config(&Config::default())
    }

    fn sentence(tokens: &[(&str, &str, Option<&str>)]) -> Sentence {
        tokens
            .iter()
            .map(|(f, t, l)| Token::new(f, t, *l))
            .collect()
    }

    #[test]
    fn test_encode_sentences() {
        let text = codec().encode(
            "1",
            &[
                sentence(&[("Cats", "NNS", Some("cat")), ("sleep", "VBP", Some("sleep"))]),
                sentence(&[("Dogs", "NNS", Some("dog"))]),
            ],
        );
        assert_eq!(
            text,
            "<s id=\"0\">\nCats\tNNS\tcat-n\nsleep\tVBP\tsleep-v\n</s>\n<s id=\"1\">\nDogs\tNNS\tdog-n\n</s>\n"
        );
    }

    #[test]
    fn test_numeric_lemma_placeholder() {
        let c = codec();
        let text = c.encode(
            "1",
            &[sentence(&[
                ("35", "CD", Some("35")),
                ("ii", "CD", Some("ii")),
                ("five", "CD", Some("five")),
                ("3rd", "JJ", Some("3rd")),
            ])],
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "35\tCD\t[number]-m");
        assert_eq!(lines[2], "ii\tCD\tii-m");
        assert_eq!(lines[3], "five\tCD\tfive-m");
        assert_eq!(lines[4], "3rd\tJJ\t3rd-j");
    }

    #[test]
    fn test_numeric_lemma_placeholder_non_ascii_digits() {
        let text = codec().encode(
            "1",
            &[sentence(&[
                ("\u{0663}\u{0665}", "CD", Some("\u{0663}\u{0665}")),
                ("\u{0968}", "CD", None),
                ("\u{2161}", "CD", Some("\u{2161}")),
            ])],
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "\u{0663}\u{0665}\tCD\t[number]-m");
        assert_eq!(lines[2], "\u{0968}\tCD\t[number]-m");
        // letter numbers are not decimal digits
        assert_eq!(lines[3], "\u{2161}\tCD\t\u{2161}-m");
    }

    #[test]
    fn test_missing_lemma_and_unknown_tag() {
        let text = codec().encode("1", &[sentence(&[("Zorp", "XYZ", None), ("7", "CD", None)])]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "Zorp\tXYZ\tZorp");
        assert_eq!(lines[2], "7\tCD\t[number]-m");
    }

    #[test]
    fn test_empty_sentences_do_not_consume_ids() {
        let c = codec();
        let text = c.encode("1", &[vec![], sentence(&[("a", "DT", Some("a"))])]);
        assert!(text.starts_with("<s id=\"0\">\n"));
        assert!(c.encode_document("1", &[vec![]]).is_none());
    }

    #[test]
    fn test_precomputed_annotator_from_reader() {
        let input = r#"{"id": 7, "sentences": [[{"form": "Hi", "tag": "UH", "lemma": "hi"}]]}

{"id": "x", "sentences": []}
"#;
        let annotator = PrecomputedAnnotator::from_reader(input.as_bytes()).unwrap();
        assert_eq!(annotator.len(), 2);
        assert_eq!(annotator.annotate("7", "").unwrap()[0][0].form, "Hi");
        assert!(annotator.annotate("missing", "").unwrap().is_empty());
        assert!(PrecomputedAnnotator::from_reader("{oops".as_bytes()).is_err());
    }

    fn annotator_for(ids: &[&str]) -> PrecomputedAnnotator {
        let mut annotator = PrecomputedAnnotator::default();
        for &id in ids {
            annotator.insert(id, vec![sentence(&[(id, "NN", Some(id))])]);
        }
        annotator
    }

    #[test]
    fn test_job_skips_existing_and_drops_empty() {
        let (_dir, repo) = repo();
        repo.upsert_records(&[body("a", "A"), body("b", "B"), body("c", "C")])
            .unwrap();
        // "b" has no annotation and is dropped
        let annotator = annotator_for(&["a", "c"]);
        let c = codec();
        let job = VerticalJob::new(&repo, &c, &annotator, "body", VerticalOptions::default());

        let first = job.run(&BatchCursor::new(2)).unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(first.dropped, 1);
        assert_eq!(repo.count_verticals().unwrap(), 2);

        let second = job.run(&BatchCursor::new(2)).unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(repo.count_verticals().unwrap(), 2);
    }

    #[test]
    fn test_job_drops_blank_text() {
        let (_dir, repo) = repo();
        repo.upsert_records(&[body("e", ""), body("w", "  \n\t "), body("a", "A")])
            .unwrap();
        let annotator = annotator_for(&["e", "w", "a"]);
        let c = codec();
        let job = VerticalJob::new(&repo, &c, &annotator, "body", VerticalOptions::default());

        let summary = job.run(&BatchCursor::new(10)).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.dropped, 2);
        assert_eq!(repo.count_verticals().unwrap(), 1);
    }

    #[test]
    fn test_job_update_mode_reannotates_changed_records() {
        let (_dir, repo) = repo();
        let mut record = body("a", "A");
        repo.upsert_records(std::slice::from_ref(&record)).unwrap();
        let annotator = annotator_for(&["a"]);
        let c = codec();

        let update = VerticalOptions {
            update: true,
            language: None,
        };
        let job = VerticalJob::new(&repo, &c, &annotator, "body", update.clone());
        assert_eq!(job.run(&BatchCursor::new(10)).unwrap().processed, 1);
        assert_eq!(job.run(&BatchCursor::new(10)).unwrap().processed, 0);

        record.changed = Utc::now() + chrono::Duration::hours(1);
        repo.upsert_records(&[record]).unwrap();
        let job = VerticalJob::new(&repo, &c, &annotator, "body", update);
        assert_eq!(job.run(&BatchCursor::new(10)).unwrap().processed, 1);
    }

    #[test]
    fn test_job_language_filter() {
        let (_dir, repo) = repo();
        repo.upsert_records(&[body("a", "A"), body("b", "B")]).unwrap();
        repo.upsert_languages(&[crate::models::LanguageDistribution {
            id: "a".to_string(),
            lid: [("en".to_string(), 0.8)].into_iter().collect(),
        }])
        .unwrap();
        let annotator = annotator_for(&["a", "b"]);
        let c = codec();
        let options = VerticalOptions {
            update: false,
            language: Some(LanguageFilter {
                language: "en".to_string(),
                min_portion: 0.5,
            }),
        };
        let summary = VerticalJob::new(&repo, &c, &annotator, "body", options)
            .run(&BatchCursor::new(10))
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.filtered, 1);
    }
}
