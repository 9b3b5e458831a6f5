//! Shared helper functions for CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::BatchCursor;
use crate::config::Config;
use crate::repository::CorpusRepository;
use crate::utils::FanOut;

use super::BatchArgs;

pub fn open_repo(config: &Config) -> anyhow::Result<CorpusRepository> {
    Ok(CorpusRepository::new(&config.database)?)
}

pub fn cursor(config: &Config, args: &BatchArgs) -> BatchCursor {
    BatchCursor::new(args.size.unwrap_or(config.batch_size))
        .with_run_limit(args.runs)
        .starting_at(args.from_run)
}

pub fn fanout(config: &Config, workers: Option<usize>) -> FanOut {
    FanOut::new(workers.unwrap_or(config.workers), config.worker_timeout())
}

pub fn output_dir(config: &Config, dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| config.export_dir.clone())
}

/// Spinner for passes whose total is unknown.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bar over a known number of files.
pub fn file_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}
