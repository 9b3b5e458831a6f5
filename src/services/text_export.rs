//! Plain-text export of record texts for an external annotator.
//!
//! Each run of the cursor becomes one chunk file,
//! `<stem>_<lang>_<start>_<end>.<N>.txt` with `N = run + 1`, holding every
//! selected record of that page as `<doc ...>` + text + `</doc>`.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::batch::{BatchCursor, Flow};
use crate::error::Result;
use crate::models::RecordSelection;
use crate::repository::CorpusRepository;
use crate::services::AttributeSynthesizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub path: PathBuf,
    pub documents: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TextExportReport {
    pub chunks: Vec<TextChunk>,
    pub documents: u64,
    /// Selected records without usable text.
    pub skipped: u64,
}

/// Path of chunk `number` (1-based).
pub fn chunk_path(dir: &Path, stem: &str, selection: &RecordSelection, number: usize) -> PathBuf {
    dir.join(format!(
        "{}_{}_{}_{}.{}.txt",
        stem, selection.language, selection.start, selection.end, number
    ))
}

pub struct TextExporter<'a> {
    repo: &'a CorpusRepository,
    synthesizer: &'a AttributeSynthesizer,
    text_field: &'a str,
}

impl<'a> TextExporter<'a> {
    pub fn new(repo: &'a CorpusRepository, synthesizer: &'a AttributeSynthesizer, text_field: &'a str) -> Self {
        Self {
            repo,
            synthesizer,
            text_field,
        }
    }

    pub fn run(
        &self,
        selection: &RecordSelection,
        cursor: &BatchCursor,
        dir: &Path,
        stem: &str,
    ) -> Result<TextExportReport> {
        std::fs::create_dir_all(dir)?;
        let mut report = TextExportReport::default();

        cursor.drive(&mut report, |report, ctx| {
            let page = cursor.fetch(ctx.run, |limit, offset| {
                self.repo.selected_page(selection, limit, offset)
            })?;
            if page.is_empty() {
                return Ok(Flow::Stop);
            }

            let mut tmp = NamedTempFile::new_in(dir)?;
            let mut documents = 0usize;
            for record in &page.rows {
                let Some(text) = record
                    .text(self.text_field)
                    .filter(|t| !t.trim().is_empty())
                else {
                    warn!(id = %record.id, field = self.text_field, "Record has no text, skipping");
                    report.skipped += 1;
                    continue;
                };
                let tag = self.synthesizer.synthesize(&record.id, &record.fields)?;
                writeln!(tmp, "{}\n{}\n</doc>", tag, text.trim_end())?;
                documents += 1;
            }

            if documents == 0 {
                debug!(run = ctx.run, "No exportable text in run, no chunk written");
                return Ok(Flow::Continue);
            }
            let path = chunk_path(dir, stem, selection, ctx.run + 1);
            tmp.persist(&path).map_err(|e| e.error)?;
            debug!(path = %path.display(), documents, "Wrote chunk");
            report.documents += documents as u64;
            report.chunks.push(TextChunk { path, documents });
            Ok(Flow::Continue)
        })?;

        info!(
            language = %selection.language,
            chunks = report.chunks.len(),
            documents = report.documents,
            skipped = report.skipped,
            "Text export done"
        );
        Ok(report)
    }
}
