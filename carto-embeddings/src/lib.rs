//! Cartograph embeddings - rate-limited vector generation for graph nodes.
//!
//! This crate wraps a remote embedding model behind a quota-aware,
//! retrying front so that the ingestion pipeline can fire requests freely.
//!
//! # Features
//!
//! - **Service seam**: any model behind [`EmbeddingService`]
//! - **OpenAI-compatible client**: `POST {base_url}/embeddings`
//! - **Token bucket**: hard per-interval call quota, no request dropped
//! - **Graceful degradation**: blank or failed texts become zero vectors
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use carto_embeddings::{
//!     BatcherConfig, EmbeddingBatcher, OpenAiClient, OpenAiConfig, TokenBucket,
//!     DEFAULT_CALLS_PER_INTERVAL, DEFAULT_INTERVAL,
//! };
//!
//! # async fn run() -> carto_embeddings::Result<()> {
//! let client = OpenAiClient::new(OpenAiConfig {
//!     api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
//!     ..Default::default()
//! })?;
//! let limiter = Arc::new(TokenBucket::new(DEFAULT_CALLS_PER_INTERVAL, DEFAULT_INTERVAL));
//! let batcher = EmbeddingBatcher::new(Arc::new(client), limiter, BatcherConfig::default());
//!
//! let vector = batcher.embed("function greet() {}").await;
//! assert_eq!(vector.len(), 768);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

mod batcher;
mod error;
mod openai;
mod rate_limit;
mod service;

pub use batcher::{nodes_per_window, BatcherConfig, EmbeddingBatcher, EmbeddingStats, EMBEDDINGS_PER_NODE};
pub use error::{EmbeddingError, Result};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use rate_limit::{TokenBucket, DEFAULT_CALLS_PER_INTERVAL, DEFAULT_INTERVAL};
pub use service::{EmbedFuture, EmbeddingService};

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 768;

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";
