//! # Corpus Harness CLI (`corpus`)
//!
//! ## Usage
//!
//! ```bash
//! corpus --config ./config/corpus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corpus init` | Create the SQLite database and run schema migrations |
//! | `corpus authors` | List configured authors and their folders |
//! | `corpus ingest <folder\|all>` | Ingest one author folder or every author |
//! | `corpus verify <folder>` | Report stored documents, chunks, and samples |
//! | `corpus search "<query>"` | Filtered semantic search |
//! | `corpus flags list` | Show contamination flags |
//! | `corpus flags clear <file>` | Clear a flag so the file is ingested next run |
//! | `corpus completions <shell>` | Print shell completions |

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use corpus_harness::models::SearchFilters;
use corpus_harness::{config, contamination, ingest, migrate, search, sources, verify};

/// Corpus Harness CLI: ingestion and retrieval for author-attributed
/// text corpora.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/corpus.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "corpus",
    about = "Corpus Harness: ingestion and retrieval for author-attributed text corpora",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/corpus.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running
    /// it repeatedly is safe.
    Init,

    /// List configured authors, their folders, and file counts.
    Authors,

    /// Ingest an author folder, or `all` for every configured author.
    ///
    /// Files already ingested are skipped, files with an open
    /// contamination flag are left out, and interrupted files resume
    /// from the first missing chunk.
    Ingest {
        /// Author folder name, or `all`.
        target: String,
    },

    /// Report what is stored for one author.
    Verify {
        /// Author folder name.
        folder: String,
    },

    /// Semantic search over ingested chunks.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to an author name (case and whitespace insensitive).
        #[arg(long)]
        author: Option<String>,

        /// Restrict to a figure id.
        #[arg(long)]
        figure: Option<String>,

        /// Restrict to a domain.
        #[arg(long)]
        domain: Option<String>,

        /// Restrict to a work title.
        #[arg(long)]
        title: Option<String>,

        /// Maximum number of results (defaults to `retrieval.default_k`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear contamination flags.
    Flags {
        #[command(subcommand)]
        action: FlagsAction,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum FlagsAction {
    /// List every flag with its state.
    List,
    /// Clear the open flag on a file (path relative to `data.root`).
    Clear { file: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "corpus", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Authors => {
            sources::run_authors(&cfg)?;
        }
        Commands::Ingest { target } => {
            ingest::run_ingest(&cfg, &target).await?;
        }
        Commands::Verify { folder } => {
            verify::run_verify(&cfg, &folder).await?;
        }
        Commands::Search {
            query,
            author,
            figure,
            domain,
            title,
            limit,
            json,
        } => {
            let filters = SearchFilters {
                author,
                figure_id: figure,
                domain,
                title,
            };
            search::run_search(&cfg, &query, filters, limit, json).await?;
        }
        Commands::Flags { action } => match action {
            FlagsAction::List => contamination::run_list_flags(&cfg).await?,
            FlagsAction::Clear { file } => contamination::run_clear_flag(&cfg, &file).await?,
        },
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
