//! Archive build, listing and export commands.

use std::path::PathBuf;

use chrono::NaiveDate;
use console::style;

use crate::config::Config;
use crate::models::{ArchiveMode, ArchiveVersion, Compression};
use crate::services::{export_archives, ArchiveBuilder, ArchiveSelector, AttributeSynthesizer, BuildOutcome};
use crate::utils::format_size;

use super::helpers::{cursor, open_repo, output_dir, spinner};
use super::BatchArgs;

pub fn cmd_archive(
    config: &Config,
    mode: ArchiveMode,
    note: Option<&str>,
    compression: Option<Compression>,
    batch: &BatchArgs,
) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    let synthesizer = AttributeSynthesizer::from_config(config);
    let builder = ArchiveBuilder::new(
        &repo,
        &synthesizer,
        compression.unwrap_or(config.compression),
    );

    let pb = spinner(&format!("Building {} archive", mode.as_str()));
    let outcome = builder.build(mode, note, &cursor(config, batch))?;
    pb.finish_and_clear();

    match outcome {
        BuildOutcome::Created {
            version,
            documents,
            bytes,
        } => println!(
            "{} Archive {} created: {} documents, {}",
            style("✓").green(),
            style(version).bold(),
            documents,
            format_size(bytes as u64)
        ),
        BuildOutcome::NoOp => println!("{} Nothing new to archive", style("!").yellow()),
    }
    Ok(())
}

pub fn cmd_archive_list(config: &Config) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    let archives = repo.list_archives()?;
    if archives.is_empty() {
        println!("{} No archives yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<8} {:>10} {:>10} {:<6} {:<20} Note",
        "Version", "Documents", "Size", "Comp", "Date"
    );
    for archive in archives {
        println!(
            "{:<8} {:>10} {:>10} {:<6} {:<20} {}",
            archive.version.to_string(),
            archive.documents,
            format_size(archive.size),
            archive.compression.as_str(),
            archive.archive_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            archive.note.unwrap_or_default()
        );
    }
    Ok(())
}

pub fn cmd_export(
    config: &Config,
    version: Option<ArchiveVersion>,
    date: Option<NaiveDate>,
    dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let selector = match (version, date) {
        (Some(version), _) => ArchiveSelector::Version(version),
        (None, Some(date)) => ArchiveSelector::Date(date),
        (None, None) => anyhow::bail!("pass --version or --date"),
    };

    let repo = open_repo(config)?;
    let paths = export_archives(&repo, selector, &output_dir(config, dir), &config.corpus)?;
    if paths.is_empty() {
        println!("{} No matching archive", style("!").yellow());
    }
    for path in paths {
        println!("{} Wrote {}", style("✓").green(), path.display());
    }
    Ok(())
}
