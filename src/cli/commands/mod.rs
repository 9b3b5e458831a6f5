//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod archive;
mod attr;
mod conllu;
mod enrich;
mod helpers;
mod import;
mod init;
mod status;
mod tagset;
mod text;
mod vert;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::batch::BatchCursor;
use crate::config::Config;
use crate::models::{ArchiveMode, ArchiveVersion, Compression, RecordSelection};
use crate::services::MwtLayout;

#[derive(Parser)]
#[command(name = "corpusmill")]
#[command(about = "Versioned vertical-corpus builder")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "CORPUSMILL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Batch paging options shared by the store passes.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct BatchArgs {
    /// Rows per run (defaults to `batch_size` from config)
    #[arg(long)]
    size: Option<usize>,
    /// Stop after this many runs (0 = unlimited)
    #[arg(long, default_value = "0")]
    runs: usize,
    /// Run to resume from
    #[arg(long, default_value = "0")]
    from_run: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema
    Init,

    /// Import records from a JSON-lines file
    Import {
        /// Records, one JSON object per line (plain, .xz or .zst)
        file: PathBuf,
        /// Per-record language distributions, JSON lines of {"id", "lid"}
        #[arg(long)]
        languages: Option<PathBuf>,
    },

    /// Build verticals for records that have none
    Vert {
        /// Precomputed annotations, JSON lines of {"id", "sentences"}
        #[arg(short, long)]
        annotations: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
        /// Rebuild verticals of records changed since their last build
        #[arg(long)]
        update: bool,
        /// Only records whose language portion reaches --min-portion
        #[arg(long)]
        language: Option<String>,
        /// Minimum portion for --language
        #[arg(long, default_value = "0.2")]
        min_portion: f64,
    },

    /// Synthesize document attributes
    Attr {
        /// Recompute attributes that are already stored
        #[arg(long)]
        overwrite: bool,
        /// Shard by record year across the worker pool
        #[arg(long)]
        partitioned: bool,
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Build a new archive version
    Archive {
        /// full: everything, new major version; add: only new documents
        #[arg(value_enum, required_unless_present = "list")]
        mode: Option<ArchiveMode>,
        /// Note stored with the archive
        #[arg(short, long)]
        note: Option<String>,
        /// Payload compression (defaults to config)
        #[arg(long, value_enum)]
        compression: Option<Compression>,
        #[command(flatten)]
        batch: BatchArgs,
        /// List archives instead of building one
        #[arg(long)]
        list: bool,
    },

    /// Write archive payloads to files
    Export {
        /// Archive version, e.g. 1.2
        #[arg(long, conflicts_with = "date", required_unless_present = "date")]
        version: Option<ArchiveVersion>,
        /// Every archive built on this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Output directory (defaults to export_dir from config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Export record texts in one language as chunked files for annotation
    ExportText {
        /// Language code, e.g. en
        #[arg(short, long)]
        language: String,
        /// Minimum portion of the text in the language
        #[arg(long, default_value = "0.8")]
        min_portion: f64,
        /// First record date included (YYYY-MM-DD)
        #[arg(long, default_value = "1900-01-01")]
        start: NaiveDate,
        /// Last record date included (YYYY-MM-DD)
        #[arg(long, default_value = "2100-12-31")]
        end: NaiveDate,
        /// Records per chunk file
        #[arg(long, default_value = "10000")]
        chunk_size: usize,
        /// Stop after this many chunks (0 = all)
        #[arg(long, default_value = "0")]
        chunks: usize,
        /// File name prefix (defaults to the corpus name)
        #[arg(long)]
        stem: Option<String>,
        /// Output directory (defaults to export_dir from config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Export the distinct tags used by stored verticals
    Tagset {
        /// Output directory (defaults to export_dir from config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Normalize CoNLL-U files to vertical files
    Conllu {
        /// Input files (plain, .xz or .zst)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// How multi-word tokens are written
        #[arg(long, value_enum, default_value = "spliced-before-members")]
        layout: MwtLayout,
        /// Compare document counts of input and output
        #[arg(long)]
        verify: bool,
        /// Parallel workers (defaults to config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Add container tags, document refs and sentence languages to vertical files
    Enrich {
        /// Files named <stem>.<int>.vert[.xz]
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Document refs start after this number
        #[arg(long, default_value = "0")]
        doc_start: u64,
        /// Container refs start after this number
        #[arg(long, default_value = "0")]
        docx_start: u64,
        /// Use random UUIDs for refs
        #[arg(long)]
        random_refs: bool,
        /// Tag sentences from <file>.lid.tsv
        #[arg(long)]
        langid: bool,
        /// Compress output
        #[arg(long, value_enum, num_args = 0..=1, default_missing_value = "xz", require_equals = true)]
        compress: Option<Compression>,
        /// Keep originals after compression
        #[arg(long)]
        keep: bool,
    },

    /// Show corpus status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&config),
        Commands::Import { file, languages } => {
            import::cmd_import(&config, &file, languages.as_deref())
        }
        Commands::Vert {
            annotations,
            batch,
            update,
            language,
            min_portion,
        } => vert::cmd_vert(&config, &annotations, &batch, update, language, min_portion),
        Commands::Attr {
            overwrite,
            partitioned,
            batch,
        } => attr::cmd_attr(&config, overwrite, partitioned, &batch).await,
        Commands::Archive {
            mode,
            note,
            compression,
            batch,
            list,
        } => match mode {
            Some(mode) if !list => {
                archive::cmd_archive(&config, mode, note.as_deref(), compression, &batch)
            }
            _ => archive::cmd_archive_list(&config),
        },
        Commands::Export { version, date, dir } => {
            archive::cmd_export(&config, version, date, dir)
        }
        Commands::ExportText {
            language,
            min_portion,
            start,
            end,
            chunk_size,
            chunks,
            stem,
            dir,
        } => text::cmd_export_text(
            &config,
            RecordSelection {
                language,
                min_portion,
                date_field: config.date_field.clone(),
                start,
                end,
            },
            BatchCursor::new(chunk_size).with_run_limit(chunks),
            stem,
            dir,
        ),
        Commands::Tagset { dir } => tagset::cmd_tagset(&config, dir),
        Commands::Conllu {
            files,
            layout,
            verify,
            workers,
        } => conllu::cmd_conllu(&config, files, layout, verify, workers).await,
        Commands::Enrich {
            files,
            doc_start,
            docx_start,
            random_refs,
            langid,
            compress,
            keep,
        } => enrich::cmd_enrich(
            &files,
            doc_start,
            docx_start,
            random_refs,
            langid,
            compress,
            keep,
        ),
        Commands::Status { json } => status::cmd_status(&config, json),
    }
}
