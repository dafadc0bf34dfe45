//! Cartograph daemon library - ingestion of code knowledge graphs.
//!
//! This library provides:
//! - Configuration (`.cartorc.toml`)
//! - Storage layer (graph store seam and its DuckDB implementation)
//! - Ingestion phases (batch files, embedding, loading, reference documents)
//! - The pipeline driver tying them together
//! - The HTTP trigger used by the `carto-daemon` binary

pub mod build;
pub mod config;
pub mod ingest;
pub mod server;
pub mod storage;

pub use build::{IngestPipeline, IngestSummary, PipelineOptions, PrepareReport};
pub use config::{CartoConfig, ConfigError};
pub use storage::{Corpus, GraphStore, GraphTransaction, KnowledgeBase, StoreError};
