//! # askdocs CLI
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs ingest [PATHS...]` | Ingest the given files, or scan the docs folder |
//! | `askdocs watch` | Scan once, then ingest new or changed files until Ctrl-C |
//! | `askdocs ask "<question>"` | Answer one question |
//! | `askdocs chat` | Interactive question/answer session |
//! | `askdocs status` | Show what is indexed (works offline) |
//! | `askdocs prune` | Drop chunks and state for files no longer in the docs folder |
//!
//! A missing runtime, an unopenable index, or (for `ask`/`chat`) an empty
//! index ends the process with a message and a non-zero exit status.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use askdocs::chat::{render_answer, render_failure, ChatSession};
use askdocs::config::{self, Config};
use askdocs::error::StartupError;
use askdocs::ingest::DocumentFilter;
use askdocs::watch::WatchSettings;
use askdocs::{logging, startup, status, watch};

/// Ask questions about your own documents, fully offline.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "Local, offline question answering over a personal PDF library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/askdocs.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/askdocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents.
    ///
    /// With no paths, scans the configured docs folder. Documents whose
    /// modification time has not changed since the last ingest are skipped.
    Ingest {
        /// Specific files to ingest.
        paths: Vec<PathBuf>,
    },

    /// Scan the docs folder, then keep ingesting new or updated files.
    Watch,

    /// Answer one question from the indexed documents.
    Ask {
        question: String,

        /// Also print the retrieved chunks.
        #[arg(long)]
        show_context: bool,

        /// Number of chunks to retrieve (overrides `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start an interactive question/answer session.
    Chat,

    /// Show index and ingestion status. Does not contact the model runtime.
    Status,

    /// Remove index entries for documents no longer in the docs folder.
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config).map_err(|e| StartupError::Config(format!("{:#}", e)))?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Ingest { paths } => run_ingest(&cfg, paths).await?,
        Commands::Watch => {
            let pipeline = startup::ingest_pipeline(&cfg).await?;
            let filter = DocumentFilter::from_config(&cfg)?;
            watch::watch(&pipeline, &filter, &WatchSettings::from_config(&cfg)).await?;
        }
        Commands::Ask {
            question,
            show_context,
            top_k,
        } => {
            let mut generator = startup::answer_generator(&cfg).await?;
            if let Some(k) = top_k {
                generator = generator.with_top_k(k.max(1));
            }

            let mut stdout = std::io::stdout();
            match generator.answer(&question).await {
                Ok(answer) => render_answer(&mut stdout, &answer, show_context)?,
                Err(e) => render_failure(&mut stdout, &e)?,
            }
        }
        Commands::Chat => {
            let generator = startup::answer_generator(&cfg).await?;
            let mut session = ChatSession::new(&generator);
            session
                .run(
                    BufReader::new(tokio::io::stdin()),
                    &mut std::io::stdout(),
                    async {
                        let _ = tokio::signal::ctrl_c().await;
                    },
                )
                .await?;
        }
        Commands::Status => {
            let index = startup::open_index(&cfg).await?;
            status::write_status(&mut std::io::stdout(), &cfg, &index).await?;
            index.close().await;
        }
        Commands::Prune => {
            let pipeline = startup::offline_pipeline(&cfg).await?;
            let filter = DocumentFilter::from_config(&cfg)?;
            let summary = pipeline.prune(&filter).await?;
            status::write_prune_summary(&mut std::io::stdout(), &summary)?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, paths: Vec<PathBuf>) -> Result<()> {
    let pipeline = startup::ingest_pipeline(cfg).await?;

    let summary = if paths.is_empty() {
        let filter = DocumentFilter::from_config(cfg)?;
        std::fs::create_dir_all(filter.root())?;
        pipeline.scan(&filter).await?
    } else {
        pipeline.ingest_all(&paths).await
    };

    status::write_scan_summary(&mut std::io::stdout(), &summary)?;
    Ok(())
}
