//! Carto CLI - build code knowledge graphs from TypeScript/JavaScript sources
//!
//! Scans a source tree, resolves declarations and their relations, embeds
//! names and code, and loads the result into a DuckDB graph database.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod output;

use commands::{docs, embed, ingest, load, prepare, status, GlobalOptions};
use output::{JsonOutput, OutputConfig, OutputFormat};

/// Code knowledge graphs for TypeScript and JavaScript projects.
#[derive(Parser)]
#[command(name = "carto")]
#[command(author, version)]
#[command(about = "Build a code knowledge graph from TypeScript/JavaScript sources")]
#[command(propagate_version = true)]
#[command(after_help = "Quick Start:
  carto ingest .          Build, embed and load the graph
  carto status            Show what the graph contains

Phases (resumable):
  carto prepare .         Write node batches to .carto/work/prepared
  carto embed             Embed them into .carto/work/embedded
  carto load              Load the embedded batches")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Fail on .cartorc.toml errors instead of using defaults
    #[arg(long, global = true)]
    strict: bool,

    /// Graph database path (overrides [database] path)
    #[arg(long, global = true, env = "CARTO_DB")]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, embed and load a source tree in one run
    #[command(visible_alias = "i")]
    Ingest {
        /// Source root (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Load nodes without embeddings
        #[arg(long)]
        no_embed: bool,

        /// Skip reloading the reference documents
        #[arg(long)]
        no_docs: bool,
    },

    /// Build the graph into batch files without loading it
    Prepare {
        /// Source root (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Output directory, relative to the source root
        #[arg(short, long)]
        output: Option<String>,

        /// Skip the first N file steps and keep existing batch files
        #[arg(long, default_value = "0")]
        start_from: usize,
    },

    /// Embed prepared batch files
    Embed {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Directory of prepared batch files
        #[arg(short, long)]
        input: Option<String>,

        /// Directory for the embedded batch files
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Load batch files into the graph database
    Load {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Directory of batch files to load
        #[arg(short, long)]
        input: Option<String>,

        /// Resume at this load batch; 0 replaces the code corpus first
        #[arg(long, default_value = "0")]
        start_batch: usize,
    },

    /// Reload the reference documents listed in the configuration
    Docs {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Show graph database status
    #[command(visible_alias = "st")]
    Status {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug,carto_embeddings=info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

async fn dispatch(command: Commands, global: &GlobalOptions) -> anyhow::Result<()> {
    match command {
        Commands::Ingest {
            path,
            no_embed,
            no_docs,
        } => ingest::run(&path, no_embed, no_docs, global).await,
        Commands::Prepare {
            path,
            output,
            start_from,
        } => prepare::run(&path, output.as_deref(), start_from, global).await,
        Commands::Embed {
            path,
            input,
            output,
        } => embed::run(&path, input.as_deref(), output.as_deref(), global).await,
        Commands::Load {
            path,
            input,
            start_batch,
        } => load::run(&path, input.as_deref(), start_batch, global).await,
        Commands::Docs { path } => docs::run(&path, global).await,
        Commands::Status { path } => status::run(&path, global).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            let _ = Cli::command().print_help();
            println!();
            return Ok(());
        }
    };

    let global = GlobalOptions {
        format: cli.format,
        quiet: cli.quiet,
        strict: cli.strict,
        db: cli.db,
    };

    let result = dispatch(command, &global).await;
    if let (Err(e), OutputFormat::Json) = (&result, global.format) {
        println!("{}", JsonOutput::format_error(e, &OutputConfig::new(OutputFormat::Json)));
        std::process::exit(1);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest_defaults() {
        let cli = Cli::try_parse_from(["carto", "ingest"]).unwrap();
        match cli.command {
            Some(Commands::Ingest {
                path,
                no_embed,
                no_docs,
            }) => {
                assert_eq!(path, ".");
                assert!(!no_embed);
                assert!(!no_docs);
            }
            _ => panic!("expected ingest"),
        }
        assert_eq!(cli.format, OutputFormat::Table);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "carto", "load", "proj", "--start-batch", "3", "--format", "json", "--strict",
        ])
        .unwrap();
        assert!(cli.strict);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Some(Commands::Load {
                path, start_batch, ..
            }) => {
                assert_eq!(path, "proj");
                assert_eq!(start_batch, 3);
            }
            _ => panic!("expected load"),
        }
    }

    #[test]
    fn test_parse_rejects_negative_start() {
        assert!(Cli::try_parse_from(["carto", "prepare", "--start-from", "-1"]).is_err());
    }
}
