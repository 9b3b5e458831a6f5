//! Secondary pass over exported vertical files: container tags, document
//! references and per-sentence language ids.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Compression;
use crate::utils::compress::{open_reader, strip_compression, with_compression, FileSink};
use crate::utils::xml::{close_tag_name, escape_attr, open_tag_name, parse_tag_attrs, render_tag};

/// How reference ids are issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPolicy {
    /// `next + 1`, `next + 2`, ... across every file of one run.
    Sequential { next: u64 },
    /// A fresh UUID v4 per reference.
    Random,
}

impl RefPolicy {
    pub fn sequential(start: u64) -> Self {
        Self::Sequential { next: start }
    }

    pub fn next_ref(&mut self) -> String {
        match self {
            Self::Sequential { next } => {
                *next += 1;
                next.to_string()
            }
            Self::Random => Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichOptions {
    /// Compress the rewritten file; `None` keeps it plain.
    pub compress: Option<Compression>,
    /// Keep the original when the output lands at a different path.
    pub keep: bool,
    /// Tag sentences from `<file>.lid.tsv`.
    pub langid: bool,
}

#[derive(Debug, Clone)]
pub struct EnrichReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub container_ref: String,
    pub documents: u64,
    pub tagged_sentences: u64,
}

/// Generation index of `<stem>.<int>.vert[.xz|.zst]`.
pub fn generation_index(path: &Path) -> Result<u64> {
    let invalid = || Error::FileName(path.display().to_string());
    let base = strip_compression(path);
    let stem = base
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(".vert"))
        .ok_or_else(invalid)?;
    let (_, index) = stem.rsplit_once('.').ok_or_else(invalid)?;
    index.parse().map_err(|_| invalid())
}

/// Order files by generation index, not by name.
pub fn sort_by_generation(files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut indexed = files
        .iter()
        .map(|f| Ok((generation_index(f)?, f.clone())))
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, f)| f).collect())
}

fn language_index_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lid.tsv");
    PathBuf::from(name)
}

/// Load `index<TAB>lang` rows; rows with a non-numeric index are skipped.
pub fn load_language_index(path: &Path) -> Result<Option<HashMap<usize, String>>> {
    let index_path = language_index_path(path);
    if !index_path.exists() {
        warn!(path = %index_path.display(), "Language index missing, sentences left untagged");
        return Ok(None);
    }

    let mut index = HashMap::new();
    for line in fs::read_to_string(&index_path)?.lines() {
        let mut cols = line.split('\t');
        let (Some(line_no), Some(lang)) = (cols.next(), cols.next()) else {
            continue;
        };
        let (Ok(line_no), lang) = (line_no.trim().parse::<usize>(), lang.trim()) else {
            continue;
        };
        if !lang.is_empty() {
            index.insert(line_no, lang.to_string());
        }
    }
    debug!(path = %index_path.display(), entries = index.len(), "Loaded language index");
    Ok(Some(index))
}

/// Rewrite a `<doc>` tag with a new `ref`: `id`, `file_id`, `ref`, then the rest.
pub fn update_doc_tag(line: &str, doc_ref: &str) -> Result<String> {
    let mut attrs = parse_tag_attrs(line)?;
    attrs.retain(|(k, v)| k != "ref" && !v.is_empty());

    let mut ordered = Vec::with_capacity(attrs.len() + 1);
    for key in ["id", "file_id"] {
        if let Some(pos) = attrs.iter().position(|(k, _)| k == key) {
            ordered.push(attrs.remove(pos));
        }
    }
    ordered.push(("ref".to_string(), doc_ref.to_string()));
    ordered.extend(attrs);
    Ok(render_tag("doc", &ordered))
}

/// Set `lang` on an `<s>` tag, keeping attribute order.
pub fn update_s_tag(line: &str, lang: &str) -> Result<String> {
    let mut attrs = parse_tag_attrs(line)?;
    attrs.retain(|(_, v)| !v.is_empty());
    match attrs.iter_mut().find(|(k, _)| k == "lang") {
        Some((_, value)) => *value = lang.to_string(),
        None => attrs.push(("lang".to_string(), lang.to_string())),
    }
    Ok(render_tag("s", &attrs))
}

pub struct Enricher {
    doc_refs: RefPolicy,
    docx_refs: RefPolicy,
    options: EnrichOptions,
}

impl Enricher {
    pub fn new(doc_refs: RefPolicy, docx_refs: RefPolicy, options: EnrichOptions) -> Self {
        Self {
            doc_refs,
            docx_refs,
            options,
        }
    }

    /// Enrich every file in generation order.
    pub fn run(&mut self, files: &[PathBuf]) -> Result<Vec<EnrichReport>> {
        let mut reports = Vec::with_capacity(files.len());
        for file in sort_by_generation(files)? {
            reports.push(self.enrich_file(&file)?);
        }
        Ok(reports)
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        let base = strip_compression(input);
        match self.options.compress {
            Some(compression) => with_compression(&base, compression),
            None => base,
        }
    }

    /// Rewrite one file through a temporary sibling, then replace the target.
    pub fn enrich_file(&mut self, input: &Path) -> Result<EnrichReport> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::FileName(input.display().to_string()))?
            .to_string();
        let languages = if self.options.langid {
            load_language_index(input)?
        } else {
            None
        };
        let output = self.output_path(input);
        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let container_ref = self.docx_refs.next_ref();
        let mut report = EnrichReport {
            input: input.to_path_buf(),
            output: output.clone(),
            container_ref: container_ref.clone(),
            documents: 0,
            tagged_sentences: 0,
        };

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let reader = open_reader(input)?;
            let mut sink = FileSink::new(tmp.as_file().try_clone()?, self.options.compress)?;
            writeln!(
                sink,
                "<docx ref=\"{}\" name=\"{}\">",
                escape_attr(&container_ref),
                escape_attr(&name)
            )?;

            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                let rewritten = match open_tag_name(&line) {
                    Some("docx") => continue,
                    Some("doc") => {
                        report.documents += 1;
                        update_doc_tag(&line, &self.doc_refs.next_ref())?
                    }
                    Some("s") => match languages.as_ref().and_then(|l| l.get(&line_no)) {
                        Some(lang) => {
                            report.tagged_sentences += 1;
                            update_s_tag(&line, lang)?
                        }
                        None => line,
                    },
                    _ if close_tag_name(&line) == Some("docx") => continue,
                    _ => line,
                };
                writeln!(sink, "{}", rewritten)?;
            }
            writeln!(sink, "</docx>")?;
            sink.finish()?;
        }
        tmp.persist(&output).map_err(|e| e.error)?;

        if output != input && !self.options.keep {
            fs::remove_file(input)?;
            debug!(path = %input.display(), "Removed original");
        }
        info!(
            input = %input.display(),
            output = %output.display(),
            documents = report.documents,
            tagged = report.tagged_sentences,
            "Enriched {}",
            name
        );
        Ok(report)
    }
}
