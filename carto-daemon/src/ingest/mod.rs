//! Ingestion phases between the built node set and the graph store.
//!
//! - `batch_files`: intermediate `batch-NNNNN.json` files
//! - `embed`: fill name/code embeddings under the rate limit
//! - `loader`: one transaction per batch, resumable
//! - `reference_docs`: the style-guide corpus

pub mod batch_files;
pub mod embed;
pub mod loader;
pub mod reference_docs;

pub use embed::{embed_batch_files, embed_nodes, EmbedPhaseReport};
pub use loader::{
    batch_count, load_blocking, FailedBatch, GraphLoader, LoadError, LoadReport, LoaderConfig,
    DEFAULT_LOAD_BATCH_SIZE,
};
pub use reference_docs::{
    fetch_reference_docs, load_reference_docs, store_reference_docs, FetchFailure, ReferenceDoc,
    ReferenceDocsReport,
};
