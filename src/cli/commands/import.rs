//! JSON-lines record import command.

use std::io::BufRead;
use std::path::Path;

use console::style;

use crate::config::Config;
use crate::models::{LanguageDistribution, Record};
use crate::repository::CorpusRepository;
use crate::utils::compress::open_reader;

use super::helpers::{open_repo, spinner};

/// Import records and, optionally, their language distributions.
pub fn cmd_import(config: &Config, file: &Path, languages: Option<&Path>) -> anyhow::Result<()> {
    let repo = open_repo(config)?;

    let imported = import_records(&repo, file, config.batch_size)?;
    println!(
        "{} Imported {} records from {}",
        style("✓").green(),
        imported,
        file.display()
    );

    if let Some(path) = languages {
        let imported = import_languages(&repo, path, config.batch_size)?;
        println!(
            "{} Imported {} language distributions from {}",
            style("✓").green(),
            imported,
            path.display()
        );
    }
    Ok(())
}

fn import_records(repo: &CorpusRepository, file: &Path, batch_size: usize) -> anyhow::Result<usize> {
    let pb = spinner(&format!("Importing {}", file.display()));
    let mut batch = Vec::with_capacity(batch_size);
    let mut imported = 0;

    for (n, line) in open_reader(file)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line)
            .map_err(|e| anyhow::anyhow!("{}:{}: {}", file.display(), n + 1, e))?;
        batch.push(Record::from_json(value)?);

        if batch.len() >= batch_size {
            imported += repo.upsert_records(&batch)?;
            batch.clear();
            pb.set_message(format!("{} records", imported));
        }
    }
    if !batch.is_empty() {
        imported += repo.upsert_records(&batch)?;
    }
    pb.finish_and_clear();
    Ok(imported)
}

fn import_languages(repo: &CorpusRepository, file: &Path, batch_size: usize) -> anyhow::Result<usize> {
    let mut batch = Vec::with_capacity(batch_size);
    let mut imported = 0;

    for (n, line) in open_reader(file)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: LanguageDistribution = serde_json::from_str(&line)
            .map_err(|e| anyhow::anyhow!("{}:{}: {}", file.display(), n + 1, e))?;
        batch.push(row);

        if batch.len() >= batch_size {
            imported += repo.upsert_languages(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        imported += repo.upsert_languages(&batch)?;
    }
    Ok(imported)
}
