//! Cartograph daemon - HTTP trigger for the ingestion pipeline.
//!
//! Serves:
//! - `GET /health`
//! - `GET /status`
//! - `POST /ingest {"path": "..."}`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use carto_daemon::build::{IngestPipeline, PipelineOptions};
use carto_daemon::config::CartoConfig;
use carto_daemon::server::{create_router, AppState};
use carto_daemon::storage::{GraphStore, KnowledgeBase};

/// Cartograph ingestion daemon
#[derive(Parser, Debug)]
#[command(name = "carto-daemon")]
#[command(about = "HTTP trigger for the Cartograph ingestion pipeline")]
#[command(version)]
struct Cli {
    /// Default source root for ingest requests
    #[arg(default_value = ".")]
    root: PathBuf,

    /// HTTP port to listen on (overrides `[server].port`)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the graph database (overrides `[database].path`)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Ingest the root once on startup
    #[arg(long)]
    ingest: bool,

    /// Fail on an unreadable or invalid `.cartorc.toml`
    #[arg(long)]
    strict: bool,

    /// Skip the embedding phase
    #[arg(long)]
    no_embed: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    // Resolve paths
    let root = cli.root.canonicalize().unwrap_or(cli.root.clone());
    let config = if cli.strict {
        CartoConfig::load_strict(&root)?
    } else {
        CartoConfig::load(&root)
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path(&root));

    info!("Starting Cartograph daemon for {:?}", root);
    info!("Database: {:?}", db_path);

    let kb = Arc::new(KnowledgeBase::open(&db_path)?);
    kb.ping().context("Database is not usable")?;

    let batcher = if cli.no_embed {
        None
    } else {
        IngestPipeline::batcher_from_config(&config)?
    };
    let store: Arc<dyn GraphStore> = kb.clone();
    let pipeline = IngestPipeline::new(
        config.clone(),
        store,
        batcher,
        PipelineOptions {
            embed: !cli.no_embed,
            ..Default::default()
        },
    );

    let state = AppState::new(pipeline, kb, root.clone());

    if cli.ingest {
        info!("Ingesting {:?} on startup...", root);
        let summary = state.pipeline.ingest(&root).await?;
        state
            .kb
            .set_metadata("last_ingest", &summary.started_at.to_rfc3339())?;
        info!(
            "Ingest complete: {} nodes, {} relations in {:?}",
            summary.node_count,
            summary.relation_count,
            summary.duration()
        );
    }

    let router = create_router(state);
    let addr = format!("0.0.0.0:{}", cli.port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Cartograph daemon listening on http://{}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}
