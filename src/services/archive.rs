//! Versioned archive builds and exports.

use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::batch::{BatchCursor, Flow};
use crate::error::Result;
use crate::models::{join_document, ArchiveMode, ArchiveVersion, Compression, NewArchive};
use crate::repository::CorpusRepository;
use crate::services::attribute::AttributeSynthesizer;
use crate::utils::compress::StreamEncoder;
use crate::utils::format_size;

/// Per-build state threaded through the batch loop.
struct ArchiveState {
    encoder: StreamEncoder,
    ids: Vec<String>,
    archived: HashSet<String>,
    skipped: u64,
    missing: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Created {
        version: ArchiveVersion,
        documents: usize,
        bytes: usize,
    },
    /// Nothing new to archive; no row was written.
    NoOp,
}

pub struct ArchiveBuilder<'a> {
    repo: &'a CorpusRepository,
    synthesizer: &'a AttributeSynthesizer,
    compression: Compression,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(
        repo: &'a CorpusRepository,
        synthesizer: &'a AttributeSynthesizer,
        compression: Compression,
    ) -> Self {
        Self {
            repo,
            synthesizer,
            compression,
        }
    }

    pub fn build(
        &self,
        mode: ArchiveMode,
        note: Option<&str>,
        cursor: &BatchCursor,
    ) -> Result<BuildOutcome> {
        let previous = self.repo.latest_archive_version()?;
        let version = ArchiveVersion::next(previous.as_ref(), mode);
        let archived = match mode {
            ArchiveMode::Add => self.repo.archived_ids()?,
            ArchiveMode::Full => HashSet::new(),
        };
        info!(
            mode = mode.as_str(),
            previous = ?previous.map(|v| v.to_string()),
            "Building archive {}",
            version
        );

        let mut state = ArchiveState {
            encoder: StreamEncoder::new(self.compression)?,
            ids: Vec::new(),
            archived,
            skipped: 0,
            missing: BTreeSet::new(),
        };

        cursor.drive(&mut state, |state, ctx| {
            let page = cursor.fetch(ctx.run, |limit, offset| self.repo.document_page(limit, offset))?;
            if page.is_empty() {
                return Ok(Flow::Stop);
            }
            for row in &page.rows {
                if state.archived.contains(&row.id) {
                    state.skipped += 1;
                    continue;
                }
                let attr = match &row.attr {
                    Some(attr) => attr.clone(),
                    None => self.synthesizer.synthesize_row(row, &mut state.missing)?,
                };
                state
                    .encoder
                    .write_all(join_document(&attr, &row.vertical_text).as_bytes())?;
                state.ids.push(row.id.clone());
            }
            debug!(run = ctx.run, accepted = state.ids.len(), "Archive run");
            Ok(Flow::Continue)
        })?;

        let ArchiveState {
            encoder,
            ids,
            skipped,
            ..
        } = state;
        let payload = encoder.finish()?;

        if ids.is_empty() {
            info!(skipped, "No new documents; archive {} not created", version);
            return Ok(BuildOutcome::NoOp);
        }

        let documents = ids.len();
        let bytes = payload.len();
        self.repo.insert_archive(
            &NewArchive {
                version,
                ids,
                note: note.map(str::to_string),
                compression: self.compression,
                payload,
            },
            previous,
        )?;

        info!(
            documents,
            skipped,
            size = %format_size(bytes as u64),
            "Archive {} created",
            version
        );
        Ok(BuildOutcome::Created {
            version,
            documents,
            bytes,
        })
    }
}

/// Which archives to export.
#[derive(Debug, Clone, Copy)]
pub enum ArchiveSelector {
    Version(ArchiveVersion),
    Date(NaiveDate),
}

/// Write selected payloads to `<dir>/<corpus>_<version>.vert.<ext>`.
pub fn export_archives(
    repo: &CorpusRepository,
    selector: ArchiveSelector,
    dir: &Path,
    corpus: &str,
) -> Result<Vec<PathBuf>> {
    let archives = match selector {
        ArchiveSelector::Version(version) => repo.get_archive(&version)?.into_iter().collect(),
        ArchiveSelector::Date(date) => repo.archives_on(date)?,
    };

    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(archives.len());
    for archive in archives {
        let path = dir.join(format!(
            "{}_{}.vert.{}",
            corpus,
            archive.version,
            archive.compression.extension()
        ));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&archive.payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        info!(path = %path.display(), documents = archive.ids.len(), "Exported archive {}", archive.version);
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnnotatedDocument, AttributeSchema};
    use crate::repository::test_support::{record, repo};
    use crate::utils::compress::decode_all;
    use serde_json::json;

    fn synthesizer() -> AttributeSynthesizer {
        AttributeSynthesizer::new(AttributeSchema::default(), "body", "|", None, "date__")
    }

    fn add_document(repo: &CorpusRepository, id: &str) {
        repo.upsert_records(&[record(id, json!({"title": id, "body": "x"}))])
            .unwrap();
        repo.upsert_verticals(&[AnnotatedDocument::new(
            id,
            "<s id=\"0\">\nx\tNN\tx-n\n</s>\n".to_string(),
        )
        .unwrap()])
            .unwrap();
    }

    fn version(outcome: BuildOutcome) -> String {
        match outcome {
            BuildOutcome::Created { version, .. } => version.to_string(),
            BuildOutcome::NoOp => "no-op".to_string(),
        }
    }

    #[test]
    fn test_version_sequence() {
        let (_dir, repo) = repo();
        let synth = synthesizer();
        let builder = ArchiveBuilder::new(&repo, &synth, Compression::Xz);
        let cursor = BatchCursor::new(2);

        add_document(&repo, "a");
        assert_eq!(version(builder.build(ArchiveMode::Full, None, &cursor).unwrap()), "1.0");

        add_document(&repo, "b");
        assert_eq!(version(builder.build(ArchiveMode::Add, Some("b only"), &cursor).unwrap()), "1.1");
        assert_eq!(builder.build(ArchiveMode::Add, None, &cursor).unwrap(), BuildOutcome::NoOp);
        assert_eq!(version(builder.build(ArchiveMode::Full, None, &cursor).unwrap()), "2.0");

        let listed: Vec<(String, usize)> = repo
            .list_archives()
            .unwrap()
            .into_iter()
            .map(|a| (a.version.to_string(), a.documents))
            .collect();
        assert_eq!(
            listed,
            [("1.0".to_string(), 1), ("1.1".to_string(), 1), ("2.0".to_string(), 2)]
        );
    }

    #[test]
    fn test_payload_is_concatenated_documents() {
        let (_dir, repo) = repo();
        let synth = synthesizer();
        add_document(&repo, "a");
        add_document(&repo, "b");
        repo.set_attrs(&[("a".to_string(), "<doc id=\"a\" stored=\"yes\" >".to_string())])
            .unwrap();

        ArchiveBuilder::new(&repo, &synth, Compression::Zstd)
            .build(ArchiveMode::Full, None, &BatchCursor::new(10))
            .unwrap();
        let archive = repo.get_archive(&ArchiveVersion::INITIAL).unwrap().unwrap();
        assert_eq!(archive.ids, ["a", "b"]);

        let text = String::from_utf8(decode_all(&archive.payload, archive.compression).unwrap()).unwrap();
        assert_eq!(
            text,
            "<doc id=\"a\" stored=\"yes\" >\n<s id=\"0\">\nx\tNN\tx-n\n</s>\n</doc>\n\
             <doc id=\"b\" title=\"b\" >\n<s id=\"0\">\nx\tNN\tx-n\n</s>\n</doc>\n"
        );
    }

    #[test]
    fn test_empty_full_build_is_noop() {
        let (_dir, repo) = repo();
        let synth = synthesizer();
        let outcome = ArchiveBuilder::new(&repo, &synth, Compression::Xz)
            .build(ArchiveMode::Full, None, &BatchCursor::new(10))
            .unwrap();
        assert_eq!(outcome, BuildOutcome::NoOp);
        assert!(repo.latest_archive_version().unwrap().is_none());
    }

    #[test]
    fn test_export_by_version_and_date() {
        let (dir, repo) = repo();
        let synth = synthesizer();
        add_document(&repo, "a");
        let builder = ArchiveBuilder::new(&repo, &synth, Compression::Xz);
        builder.build(ArchiveMode::Full, None, &BatchCursor::new(10)).unwrap();

        let out = dir.path().join("exports");
        let paths = export_archives(
            &repo,
            ArchiveSelector::Version(ArchiveVersion::INITIAL),
            &out,
            "demo",
        )
        .unwrap();
        assert_eq!(paths, [out.join("demo_1.0.vert.xz")]);
        let bytes = std::fs::read(&paths[0]).unwrap();
        let text = String::from_utf8(decode_all(&bytes, Compression::Xz).unwrap()).unwrap();
        assert!(text.starts_with("<doc id=\"a\" title=\"a\" >\n"));

        let today = chrono::Utc::now().date_naive();
        let by_date = export_archives(&repo, ArchiveSelector::Date(today), &out, "demo").unwrap();
        assert_eq!(by_date.len(), 1);

        let missing = export_archives(
            &repo,
            ArchiveSelector::Version("9.9".parse().unwrap()),
            &out,
            "demo",
        )
        .unwrap();
        assert!(missing.is_empty());
    }
}
