//! Rate-limited, retrying front for an [`EmbeddingService`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::rate_limit::TokenBucket;
use crate::service::EmbeddingService;

/// Embedding calls made for each graph node (name and code).
pub const EMBEDDINGS_PER_NODE: u32 = 2;

/// Nodes that can be embedded within one rate-limit window.
pub fn nodes_per_window(calls_per_interval: u32) -> usize {
    (calls_per_interval / EMBEDDINGS_PER_NODE).max(1) as usize
}

/// Retry policy for a single text.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Counters accumulated over the batcher's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    /// Texts embedded successfully.
    pub embedded: u64,
    /// Empty texts answered with a zero vector without a service call.
    pub skipped_empty: u64,
    /// Retries performed across all texts.
    pub retries: u64,
    /// Texts that still failed after every retry (zero vector returned).
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    embedded: AtomicU64,
    skipped_empty: AtomicU64,
    retries: AtomicU64,
    failed: AtomicU64,
}

/// Shared entry point for embedding work.
///
/// Every attempt, first or retry, takes one token from the bucket, so the
/// quota holds regardless of how many tasks embed concurrently. Failures
/// never propagate: the caller always gets a vector of the service's
/// dimension.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    service: Arc<dyn EmbeddingService>,
    limiter: Arc<TokenBucket>,
    config: BatcherConfig,
    counters: Arc<Counters>,
}

impl EmbeddingBatcher {
    pub fn new(
        service: Arc<dyn EmbeddingService>,
        limiter: Arc<TokenBucket>,
        config: BatcherConfig,
    ) -> Self {
        Self {
            service,
            limiter,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.service.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    /// Nodes per rate-limit window for this batcher's quota.
    pub fn nodes_per_window(&self) -> usize {
        nodes_per_window(self.limiter.capacity())
    }

    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimension()]
    }

    /// Embed one text. Returns the zero vector for blank input or when every
    /// attempt failed.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            self.counters.skipped_empty.fetch_add(1, Ordering::Relaxed);
            return self.zero_vector();
        }

        let expected = self.dimension();
        let mut last_error: Option<EmbeddingError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                let delay = self.config.initial_backoff * 2_u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire().await;
            let result = match self.service.embed(text).await {
                Ok(vector) if vector.len() == expected => Ok(vector),
                Ok(vector) => Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                }),
                Err(e) => Err(e),
            };

            match result {
                Ok(vector) => {
                    self.counters.embedded.fetch_add(1, Ordering::Relaxed);
                    return vector;
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::debug!(
                        "Embedding attempt {}/{} failed: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        e
                    );
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "Embedding failed for a {}-char text, using zero vector: {}",
            text.len(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        self.zero_vector()
    }

    pub fn stats(&self) -> EmbeddingStats {
        EmbeddingStats {
            embedded: self.counters.embedded.load(Ordering::Relaxed),
            skipped_empty: self.counters.skipped_empty.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
