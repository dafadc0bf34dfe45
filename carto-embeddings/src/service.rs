//! The embedding-service seam.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Boxed future returned by [`EmbeddingService::embed`].
pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>>> + Send + 'a>>;

/// A remote or local model that turns text into a vector.
///
/// Implementations do not rate-limit or retry; [`crate::EmbeddingBatcher`]
/// does both on top of any service.
///
/// # Example
///
/// ```ignore
/// use carto_embeddings::{EmbedFuture, EmbeddingService};
///
/// struct Constant;
///
/// impl EmbeddingService for Constant {
///     fn embed<'a>(&'a self, _text: &'a str) -> EmbedFuture<'a> {
///         Box::pin(async move { Ok(vec![0.5; 4]) })
///     }
///
///     fn dimension(&self) -> usize {
///         4
///     }
///
///     fn model_name(&self) -> &str {
///         "constant"
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    /// Get the dimension of the embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier.
    fn model_name(&self) -> &str;
}
