//! CoNLL-U normalization command.

use std::path::PathBuf;

use console::style;

use crate::config::Config;
use crate::services::{verify_doc_counts, ConlluNormalizer, MwtLayout};

use super::helpers::{fanout, file_bar};

pub async fn cmd_conllu(
    config: &Config,
    files: Vec<PathBuf>,
    layout: MwtLayout,
    verify: bool,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let normalizer = ConlluNormalizer::new(layout);
    let pool = fanout(config, workers);

    let pb = file_bar(files.len());
    pb.set_message("normalizing");
    let outcomes = normalizer.normalize_files(files.clone(), &pool).await;

    let mut failed = 0;
    for (input, outcome) in files.iter().zip(outcomes) {
        pb.inc(1);
        match outcome.result {
            Ok((output, report)) => {
                pb.println(format!(
                    "{} {} → {} ({} docs, {} sentences, {} multi-word)",
                    style("✓").green(),
                    input.display(),
                    output.display(),
                    report.documents,
                    report.sentences,
                    report.multiword
                ));
                if verify {
                    if let Err(e) = verify_doc_counts(input, &output) {
                        pb.println(format!("{} {}", style("✗").red(), e));
                        failed += 1;
                    }
                }
            }
            Err(e) => {
                pb.println(format!("{} {}: {}", style("✗").red(), outcome.partition, e));
                failed += 1;
            }
        }
    }
    pb.finish_and_clear();

    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, files.len());
    }
    Ok(())
}
