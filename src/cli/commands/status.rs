//! Corpus status command.

use console::style;

use crate::config::Config;
use crate::utils::format_size;

use super::helpers::open_repo;

pub fn cmd_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    let records = repo.count_records()?;
    let verticals = repo.count_verticals()?;
    let missing_attrs = repo.count_missing_attrs()?;
    let archives = repo.list_archives()?;
    let archived = repo.archived_ids()?.len();
    let latest = archives.last().map(|a| a.version.to_string());

    if json {
        let status = serde_json::json!({
            "corpus": config.corpus,
            "database": repo.db_path().display().to_string(),
            "schema_version": repo.schema_version()?,
            "records": records,
            "verticals": verticals,
            "missing_attributes": missing_attrs,
            "archives": archives.len(),
            "archived_documents": archived,
            "latest_version": latest,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\n{}", style(format!("Corpus: {}", config.corpus)).bold());
    println!("{}", "-".repeat(40));
    println!("{:<22} {}", "Database:", repo.db_path().display());
    println!("{:<22} {}", "Records:", records);
    println!(
        "{:<22} {} ({} pending)",
        "Verticals:",
        verticals,
        records.saturating_sub(verticals)
    );
    let attr_status = if missing_attrs == 0 {
        style("complete".to_string()).green()
    } else {
        style(format!("{} missing", missing_attrs)).yellow()
    };
    println!("{:<22} {}", "Attributes:", attr_status);
    println!(
        "{:<22} {} ({} documents, {})",
        "Archives:",
        archives.len(),
        archived,
        format_size(archives.iter().map(|a| a.size).sum())
    );
    if let Some(version) = latest {
        println!("{:<22} {}", "Latest version:", style(version).bold());
    }
    Ok(())
}
