//! # docqa CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa chat [PDF...]` | Interactive shell: upload, process, ask |
//! | `docqa ask --pdf <PDF>... "<question>"` | Process PDFs and answer one question |
//! | `docqa chunks <PDF>...` | Show how PDFs are extracted and chunked |
//! | `docqa serve` | Start the HTTP JSON API |
//!
//! ## Examples
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! docqa chat handbook.pdf
//! docqa ask --pdf paper.pdf "What dataset was used?" --sources
//! docqa chunks paper.pdf --show
//! docqa serve --config ./config/docqa.toml
//! ```

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::config::{self, Config};
use docqa::error::DocQaError;
use docqa::pipeline::{prepare_batch, Pipeline};
use docqa::progress::{NoProgress, ProgressMode};
use docqa::repl::{self, load_upload, Shell};
use docqa::server;
use docqa::session::SessionState;

/// docqa: ask questions about PDF documents.
///
/// PDFs are chunked and embedded locally; answers come from a hosted LLM
/// (Google Gemini). The API key is read from the environment variable named
/// by `[generation].api_key_env` (default `GOOGLE_API_KEY`); a `.env` file in
/// the working directory is loaded first.
#[derive(Parser)]
#[command(name = "docqa", version, about = "Ask questions about PDF documents")]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Processing progress on stderr: `human`, `json`, or `off`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true, value_parser = ["human", "json", "off"])]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive shell.
    ///
    /// PDFs given here are staged and processed right away; more can be
    /// added with `/upload`.
    Chat {
        /// PDF files to process at startup.
        pdfs: Vec<PathBuf>,
    },

    /// Process PDFs and answer a single question.
    Ask {
        /// PDF file to process (repeatable).
        #[arg(long = "pdf", required = true)]
        pdfs: Vec<PathBuf>,

        /// The question.
        question: String,

        /// Also print the chunks the answer was based on.
        #[arg(long)]
        sources: bool,
    },

    /// Extract and chunk PDFs without embedding or asking anything.
    Chunks {
        /// PDF files to inspect.
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,

        /// Print every chunk.
        #[arg(long)]
        show: bool,
    },

    /// Start the HTTP JSON API on `[server].bind`.
    Serve,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},docqa={}", default_level, default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_mode(flag: Option<&str>) -> ProgressMode {
    flag.and_then(ProgressMode::parse)
        .unwrap_or_else(ProgressMode::default_for_tty)
}

fn load_uploads(paths: &[PathBuf]) -> Result<Vec<docqa::models::UploadedPdf>> {
    paths
        .iter()
        .map(|p| load_upload(p).map_err(|msg| anyhow::anyhow!(msg)))
        .collect()
}

fn build_pipeline(cfg: &Config, progress: ProgressMode) -> Result<Pipeline> {
    Ok(Pipeline::from_config(cfg)?.with_progress(progress.reporter()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A missing .env is fine; the variable may be set directly.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "could not load .env");
        }
    }

    let cfg = config::load_config(&cli.config)?;
    let progress = progress_mode(cli.progress.as_deref());

    match cli.command {
        Commands::Chat { pdfs } => {
            let pipeline = build_pipeline(&cfg, progress)?;
            repl::run(Shell::new(pipeline), pdfs).await?;
        }
        Commands::Ask {
            pdfs,
            question,
            sources,
        } => {
            let pipeline = build_pipeline(&cfg, progress)?;
            let docs = load_uploads(&pdfs)?;

            let mut state = SessionState::new();
            if let Err(e) = state.submit_and_process(docs, &pipeline).await {
                bail!(e.user_message());
            }
            let output = match state.ask(&question).await {
                Ok(output) => output,
                Err(e) => bail!(e.user_message()),
            };

            println!("{}", output.answer);
            if sources {
                for s in &output.source_documents {
                    println!("\n[#{} score {:.3}]\n{}", s.position, s.score, s.text.trim());
                }
            }
        }
        Commands::Chunks { pdfs, show } => {
            let docs = load_uploads(&pdfs)?;
            let batch = prepare_batch(&docs, &cfg, &NoProgress)
                .map_err(|e: DocQaError| anyhow::anyhow!(e.user_message()))?;

            println!("documents: {}", batch.documents);
            if !batch.skipped.is_empty() {
                println!("skipped: {}", batch.skipped.join(", "));
            }
            println!("pages: {}", batch.pages);
            println!("characters: {}", batch.characters);
            println!("chunks: {}", batch.chunks.len());
            if show {
                for c in &batch.chunks {
                    println!(
                        "\n--- chunk {} ({} chars) ---\n{}",
                        c.position,
                        c.text.chars().count(),
                        c.text
                    );
                }
            }
        }
        Commands::Serve => {
            let pipeline = build_pipeline(&cfg, progress)?;
            server::run_server(pipeline).await?;
        }
    }

    Ok(())
}
