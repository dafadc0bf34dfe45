//! Graph database seam used by the loaders.

use carto_core::{GraphNode, Relation};
use thiserror::Error;

use super::schema::Corpus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

/// A graph database that hands out transactions.
pub trait GraphStore: Send + Sync {
    /// Check that the store is reachable and usable.
    fn ping(&self) -> Result<(), StoreError>;

    /// Open a transaction. Dropping it without committing rolls it back.
    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>, StoreError>;
}

/// Statements executed inside one transaction.
pub trait GraphTransaction {
    /// Delete every node of `corpus` together with the relations touching
    /// those nodes. Returns the number of nodes removed.
    fn wipe(&mut self, corpus: Corpus) -> Result<usize, StoreError>;

    /// Insert a node. Returns `false` when a node with this ID already exists.
    fn create_node(&mut self, node: &GraphNode, corpus: Corpus) -> Result<bool, StoreError>;

    /// Insert `source -> relation.target` if both endpoints exist.
    /// Returns `false` when an endpoint is missing (or the edge exists).
    fn create_relation(&mut self, source: &str, relation: &Relation) -> Result<bool, StoreError>;

    /// Commit every statement. A failed commit leaves nothing applied.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
