//! Secondary enrichment command.

use std::path::PathBuf;

use console::style;

use crate::models::Compression;
use crate::services::enrich::sort_by_generation;
use crate::services::{EnrichOptions, Enricher, RefPolicy};

use super::helpers::file_bar;

pub fn cmd_enrich(
    files: &[PathBuf],
    doc_start: u64,
    docx_start: u64,
    random_refs: bool,
    langid: bool,
    compress: Option<Compression>,
    keep: bool,
) -> anyhow::Result<()> {
    let (doc_refs, docx_refs) = if random_refs {
        (RefPolicy::Random, RefPolicy::Random)
    } else {
        (
            RefPolicy::sequential(doc_start),
            RefPolicy::sequential(docx_start),
        )
    };
    let mut enricher = Enricher::new(
        doc_refs,
        docx_refs,
        EnrichOptions {
            compress,
            keep,
            langid,
        },
    );

    let ordered = sort_by_generation(files)?;
    let pb = file_bar(ordered.len());
    let mut documents = 0;
    for file in &ordered {
        pb.set_message(file.display().to_string());
        let report = enricher.enrich_file(file)?;
        documents += report.documents;
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "{} Enriched {} files, {} documents",
        style("✓").green(),
        ordered.len(),
        documents
    );
    Ok(())
}
