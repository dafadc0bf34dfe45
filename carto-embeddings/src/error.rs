//! Error types for carto-embeddings.

use thiserror::Error;

/// Result type alias for carto-embeddings operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Transport-level failure talking to the embedding endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Embedding API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },

    /// The returned vector does not have the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension of the returned vector.
        actual: usize,
    },

    /// The response contained no embedding.
    #[error("Empty response from embedding API")]
    EmptyResponse,

    /// Invalid client configuration (missing key, bad URL...).
    #[error("Invalid embedding configuration: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Any other failure reported by a service implementation.
    #[error("{0}")]
    Other(String),
}

impl EmbeddingError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Http(_) | EmbeddingError::EmptyResponse | EmbeddingError::Other(_) => {
                true
            }
            EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::DimensionMismatch { .. } => true,
            EmbeddingError::Config { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmbeddingError::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        assert!(err.to_string().contains("768"));
        assert!(err.to_string().contains("384"));

        let err = EmbeddingError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_retryable() {
        assert!(EmbeddingError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!EmbeddingError::Api {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!EmbeddingError::Config {
            message: "no key".to_string()
        }
        .is_retryable());
    }
}
