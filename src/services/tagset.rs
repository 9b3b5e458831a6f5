//! Tagset export: the distinct tags actually used by stored verticals.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::batch::{BatchCursor, Flow};
use crate::config::TagInfo;
use crate::error::Result;
use crate::repository::CorpusRepository;

#[derive(Debug, Clone)]
pub struct TagsetReport {
    pub path: PathBuf,
    pub tags: BTreeSet<String>,
    /// Used tags missing from the configured tagset.
    pub unknown: Vec<String>,
}

/// Collect the tag column of every token line.
pub fn collect_tags(vertical_text: &str, tags: &mut BTreeSet<String>) {
    for line in vertical_text.lines() {
        if line.starts_with('<') && !line.contains('\t') {
            continue;
        }
        if let Some(tag) = line.split('\t').nth(1) {
            if !tags.contains(tag) {
                tags.insert(tag.to_string());
            }
        }
    }
}

/// Write `<dir>/<corpus>.tagset.txt`, one tag per line.
pub fn export_tagset(
    repo: &CorpusRepository,
    cursor: &BatchCursor,
    tagset: &BTreeMap<String, TagInfo>,
    dir: &Path,
    corpus: &str,
) -> Result<TagsetReport> {
    let mut tags = BTreeSet::new();
    cursor.drive(&mut tags, |tags, ctx| {
        let page = cursor.fetch(ctx.run, |limit, offset| repo.vertical_text_page(limit, offset))?;
        if page.is_empty() {
            return Ok(Flow::Stop);
        }
        for text in &page.rows {
            collect_tags(text, tags);
        }
        Ok(Flow::Continue)
    })?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.tagset.txt", corpus));
    let mut tmp = NamedTempFile::new_in(dir)?;
    for tag in &tags {
        writeln!(tmp, "{}", tag)?;
    }
    tmp.persist(&path).map_err(|e| e.error)?;

    let unknown: Vec<String> = tags
        .iter()
        .filter(|t| !tagset.contains_key(*t))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        warn!(tags = ?unknown, "Tags in corpus missing from tagset");
    }
    info!(path = %path.display(), "Exported {} tags", tags.len());

    Ok(TagsetReport {
        path,
        tags,
        unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::AnnotatedDocument;
    use crate::repository::test_support::{body, repo};

    #[test]
    fn test_collect_tags_skips_structure() {
        let mut tags = BTreeSet::new();
        collect_tags(
            "<s id=\"0\">\nCats\tNNS\tcat-n\n<\tSYM\t<-x\n</s>\n",
            &mut tags,
        );
        let tags: Vec<_> = tags.into_iter().collect();
        assert_eq!(tags, ["NNS", "SYM"]);
    }

    #[test]
    fn test_export_tagset() {
        let (dir, repo) = repo();
        repo.upsert_records(&[body("a", "x")]).unwrap();
        repo.upsert_verticals(&[AnnotatedDocument::new(
            "a",
            "<s id=\"0\">\nx\tNN\tx-n\ny\tQQ\ty\n</s>\n".to_string(),
        )
        .unwrap()])
            .unwrap();

        let out = dir.path().join("out");
        let report = export_tagset(
            &repo,
            &BatchCursor::new(10),
            &Config::default().tagset,
            &out,
            "demo",
        )
        .unwrap();
        assert_eq!(report.path, out.join("demo.tagset.txt"));
        assert_eq!(std::fs::read_to_string(&report.path).unwrap(), "NN\nQQ\n");
        assert_eq!(report.unknown, ["QQ"]);
    }
}
