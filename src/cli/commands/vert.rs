//! Vertical build command.

use std::path::Path;

use console::style;

use crate::config::Config;
use crate::services::{
    LanguageFilter, PrecomputedAnnotator, VerticalCodec, VerticalJob, VerticalOptions,
};
use crate::utils::per_second;

use super::helpers::{cursor, open_repo, spinner};
use super::BatchArgs;

pub fn cmd_vert(
    config: &Config,
    annotations: &Path,
    batch: &BatchArgs,
    update: bool,
    language: Option<String>,
    min_portion: f64,
) -> anyhow::Result<()> {
    let repo = open_repo(config)?;
    let annotator = PrecomputedAnnotator::from_path(annotations)?;
    println!(
        "{} Loaded annotations for {} documents",
        style("→").cyan(),
        annotator.len()
    );

    let codec = VerticalCodec::from_config(config);
    let options = VerticalOptions {
        update,
        language: language.map(|language| LanguageFilter {
            language,
            min_portion,
        }),
    };

    let pb = spinner("Building verticals");
    let summary = VerticalJob::new(&repo, &codec, &annotator, &config.text_field, options)
        .run(&cursor(config, batch))?;
    pb.finish_and_clear();

    println!(
        "{} {} built, {} skipped, {} filtered, {} dropped ({:.0} tokens/s)",
        style("✓").green(),
        style(summary.processed).green(),
        style(summary.skipped).yellow(),
        style(summary.filtered).dim(),
        style(summary.dropped).red(),
        per_second(summary.tokens, summary.elapsed)
    );
    if batch.runs > 0 {
        println!("  Resume with --from-run {}", summary.next_run);
    }
    Ok(())
}
