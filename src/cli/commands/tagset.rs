//! Tagset export command.

use std::path::PathBuf;

use console::style;

use crate::batch::BatchCursor;
use crate::config::Config;
use crate::services::export_tagset;

use super::helpers::{open_repo, output_dir};

pub fn cmd_tagset(config: &Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    let report = export_tagset(
        &repo,
        &BatchCursor::new(config.batch_size),
        &config.tagset,
        &output_dir(config, dir),
        &config.corpus,
    )?;

    println!(
        "{} {} tags written to {}",
        style("✓").green(),
        report.tags.len(),
        report.path.display()
    );
    if !report.unknown.is_empty() {
        println!(
            "{} Not in configured tagset: {}",
            style("!").yellow(),
            report.unknown.join(", ")
        );
    }
    Ok(())
}
