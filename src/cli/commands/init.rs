//! Initialize command.

use console::style;

use crate::config::Config;

use super::helpers::open_repo;

/// Create the database file and schema.
pub fn cmd_init(config: &Config) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    std::fs::create_dir_all(&config.export_dir)?;

    if config.source_path.is_none() {
        println!(
            "{} No config file found, using defaults",
            style("!").yellow()
        );
        println!("  Create corpusmill.toml to set the tagset and attribute schema");
    }

    println!(
        "{} Initialized corpus '{}' in {} (schema v{})",
        style("✓").green(),
        config.corpus,
        repo.db_path().display(),
        repo.schema_version()?
    );
    Ok(())
}
