//! Storage layer for the knowledge graph.
//!
//! Provides:
//! - The `GraphStore` / `GraphTransaction` seam used by the loaders
//! - A DuckDB-backed implementation (`KnowledgeBase`)
//! - Schema management and corpora

mod graph_store;
mod kgbase;
mod schema;

pub use graph_store::{GraphStore, GraphTransaction, StoreError};
pub use kgbase::{KnowledgeBase, KnowledgeStats};
#[cfg(test)]
pub(crate) use kgbase::DuckTransaction;
pub use schema::{Corpus, SCHEMA_SQL, SCHEMA_VERSION};
