//! Text export command.

use std::path::PathBuf;

use console::style;

use crate::batch::BatchCursor;
use crate::config::Config;
use crate::models::RecordSelection;
use crate::services::{AttributeSynthesizer, TextExporter};

use super::helpers::{open_repo, output_dir, spinner};

pub fn cmd_export_text(
    config: &Config,
    selection: RecordSelection,
    cursor: BatchCursor,
    stem: Option<String>,
    dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if selection.start > selection.end {
        anyhow::bail!("--start {} is after --end {}", selection.start, selection.end);
    }
    let repo = open_repo(config)?;
    let synthesizer = AttributeSynthesizer::from_config(config);
    let dir = output_dir(config, dir);
    let stem = stem.unwrap_or_else(|| config.corpus.clone());

    let pb = spinner(&format!("Exporting {} texts...", selection.language));
    let report = TextExporter::new(&repo, &synthesizer, &config.text_field).run(
        &selection,
        &cursor,
        &dir,
        &stem,
    );
    pb.finish_and_clear();
    let report = report?;

    for chunk in &report.chunks {
        println!(
            "  {} ({} documents)",
            chunk.path.display(),
            chunk.documents
        );
    }
    println!(
        "{} {} documents in {} chunks",
        style("✓").green(),
        report.documents,
        report.chunks.len()
    );
    if report.skipped > 0 {
        println!(
            "{} {} records without text skipped",
            style("!").yellow(),
            report.skipped
        );
    }
    Ok(())
}
