//! Lorebook CLI - local retrieval-augmented question answering.
//!
//! # Usage
//!
//! ```bash
//! # Add documents to the corpus
//! lore ingest notes.md paper.txt
//!
//! # Query it
//! lore query "how does chunk overlap work"
//! lore query "lazy dog" --mode lexical --top-k 5
//! lore query "summarize the design" --chat --polish
//!
//! # Inspect and maintain
//! lore stats
//! lore preset accurate
//! lore reset --yes
//! ```
//!
//! Exit codes: 0 on success, 2 on configuration errors, 3 on ingest
//! failures, 4 on query failures.

mod config;
mod output;

use clap::{Parser, Subcommand};
use lorebook_core::config::Preset;
use lorebook_core::storage::RedbObjectStore;
use lorebook_core::types::{CancelToken, ChatMode, DocKind, IngestInput, QueryRequest};
use lorebook_core::{EngineError, RagEngine, RetrievalMode};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: i32 = 2;
const EXIT_INGEST: i32 = 3;
const EXIT_QUERY: i32 = 4;

/// Lorebook local RAG engine.
///
/// All documents, indexes, and query computation stay on this machine.
#[derive(Parser)]
#[command(name = "lore", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Custom data directory (default: platform standard location)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest documents (txt, md, pdf) into the local corpus
    Ingest {
        /// Files to ingest
        files: Vec<PathBuf>,
    },
    /// Query the corpus
    Query {
        /// Query text
        text: String,
        /// Retrieval mode: lexical, semantic, or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: String,
        /// Number of results (1-30)
        #[arg(long = "top-k")]
        top_k: Option<usize>,
        /// Semantic weight for hybrid fusion (0.0-1.0)
        #[arg(long)]
        alpha: Option<f32>,
        /// Generate an answer from the top passages
        #[arg(long)]
        chat: bool,
        /// Run the polish post-processor on the answer
        #[arg(long)]
        polish: bool,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Show corpus statistics
    Stats {
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Apply a configuration preset: fast, balanced, or accurate
    Preset {
        /// Preset name
        name: String,
    },
    /// Seed the starter corpus (first run only)
    Seed,
    /// Delete every document, chunk, vector, and blob
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// A failure with its process exit code.
struct CliError {
    code: i32,
    message: String,
}

impl CliError {
    fn config(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_CONFIG,
            message: message.into(),
        }
    }

    fn from_engine(err: EngineError, code: i32) -> Self {
        Self {
            code,
            message: err.to_string(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("error: {}", err.message);
        std::process::exit(err.code);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let db_path =
        config::database_path(cli.data_dir.as_ref()).map_err(|e| CliError::config(e.to_string()))?;
    let store = RedbObjectStore::open(&db_path)
        .map_err(|e| CliError::config(format!("failed to open {}: {e}", db_path.display())))?;
    let mut engine = RagEngine::with_defaults(store)
        .await
        .map_err(|e| CliError::config(e.to_string()))?;

    match cli.command {
        Command::Ingest { files } => {
            if files.is_empty() {
                return Err(CliError::config("no files given"));
            }
            let cancel = CancelToken::new();
            for path in &files {
                let input = read_input(path)?;
                let report = engine
                    .ingest(input, &cancel, |_| {})
                    .await
                    .map_err(|e| CliError::from_engine(e, EXIT_INGEST))?;
                println!(
                    "Ingested {} ({} pages, {} chunks, {} ms)",
                    path.display(),
                    report.pages,
                    report.chunks,
                    report.elapsed_ms
                );
            }
            Ok(())
        }

        Command::Query {
            text,
            mode,
            top_k,
            alpha,
            chat,
            polish,
            json,
        } => {
            let mode = RetrievalMode::parse(&mode)
                .ok_or_else(|| CliError::config(format!("unknown mode '{mode}'")))?;
            let request = QueryRequest {
                text: text.clone(),
                mode: Some(mode),
                top_k,
                alpha,
                chat_mode: if chat { ChatMode::Chat } else { ChatMode::Search },
                polish: polish.then_some(true),
            };
            let result = engine
                .query(request)
                .await
                .map_err(|e| CliError::from_engine(e, EXIT_QUERY))?;

            if json {
                println!("{}", output::format_json(&text, &result));
            } else {
                println!("{}", output::format_human(&text, &result));
            }
            Ok(())
        }

        Command::Stats { json } => {
            let stats = engine
                .stats()
                .await
                .map_err(|e| CliError::from_engine(e, EXIT_QUERY))?;
            if json {
                println!("{}", output::format_stats_json(&stats));
            } else {
                print!("{}", output::format_stats(&stats));
            }
            Ok(())
        }

        Command::Preset { name } => {
            let preset = Preset::parse(&name)
                .ok_or_else(|| CliError::config(format!("unknown preset '{name}'")))?;
            engine
                .apply_preset(preset)
                .await
                .map_err(|e| CliError::from_engine(e, EXIT_CONFIG))?;
            println!("Applied preset '{name}'");
            Ok(())
        }

        Command::Seed => {
            let seeded = engine
                .seed_samples()
                .await
                .map_err(|e| CliError::from_engine(e, EXIT_INGEST))?;
            if seeded > 0 {
                println!("Seeded {seeded} sample documents");
            } else {
                println!("Corpus already populated, nothing to seed");
            }
            Ok(())
        }

        Command::Reset { yes } => {
            if !yes {
                return Err(CliError::config(
                    "reset deletes the whole corpus; pass --yes to confirm",
                ));
            }
            engine
                .reset()
                .await
                .map_err(|e| CliError::from_engine(e, EXIT_INGEST))?;
            println!("Corpus cleared");
            Ok(())
        }
    }
}

fn read_input(path: &PathBuf) -> Result<IngestInput, CliError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| CliError::config(format!("not a file: {}", path.display())))?;
    let kind = DocKind::from_name(&name).ok_or_else(|| CliError {
        code: EXIT_INGEST,
        message: format!("unsupported file kind: {}", path.display()),
    })?;
    let bytes = std::fs::read(path).map_err(|e| CliError {
        code: EXIT_INGEST,
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    Ok(IngestInput { name, kind, bytes })
}
