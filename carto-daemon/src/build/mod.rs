//! Ingestion pipeline driver.
//!
//! Orchestrates:
//! 1. Checking the graph store (fatal when unreachable)
//! 2. Building the node set (carto-core scanner + resolver)
//! 3. Embedding names and code under the rate limit
//! 4. Loading batches into the graph store
//! 5. Replacing the reference-document corpus
//!
//! Each phase can also run on its own over intermediate batch files.

mod pipeline;

pub use pipeline::{IngestPipeline, IngestSummary, PipelineOptions, PrepareReport};
