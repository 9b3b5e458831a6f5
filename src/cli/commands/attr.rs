//! Attribute synthesis command.

use std::sync::Arc;

use console::style;

use crate::config::Config;
use crate::services::attribute::run_partitioned;
use crate::services::{AttributeJob, AttributeSynthesizer};

use super::helpers::{cursor, fanout, open_repo, spinner};
use super::BatchArgs;

pub async fn cmd_attr(
    config: &Config,
    overwrite: bool,
    partitioned: bool,
    batch: &BatchArgs,
) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    let synthesizer = AttributeSynthesizer::from_config(config);

    let pb = spinner("Synthesizing attributes");
    let summary = if partitioned {
        run_partitioned(
            repo.db_path().to_path_buf(),
            Arc::new(synthesizer),
            overwrite,
            &fanout(config, None),
        )
        .await?
    } else {
        AttributeJob::new(&repo, &synthesizer, overwrite).run(&cursor(config, batch))?
    };
    pb.finish_and_clear();

    println!(
        "{} {} attributes written, {} kept",
        style("✓").green(),
        style(summary.written).green(),
        style(summary.skipped).yellow()
    );
    if !summary.missing.is_empty() {
        println!(
            "{} Not in schema: {}",
            style("!").yellow(),
            summary.missing.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    for partition in &summary.failed_partitions {
        println!("{} Partition failed: {}", style("✗").red(), partition);
    }
    if !summary.failed_partitions.is_empty() {
        anyhow::bail!("{} partitions failed", summary.failed_partitions.len());
    }
    Ok(())
}
