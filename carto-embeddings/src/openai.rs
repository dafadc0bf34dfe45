//! OpenAI-compatible HTTP embedding client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};
use crate::service::{EmbedFuture, EmbeddingService};
use crate::{DEFAULT_DIMENSION, DEFAULT_MODEL};

/// Connection settings for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub dimension: usize,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            dimension: DEFAULT_DIMENSION,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    dimensions: usize,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
}

/// Single-text embedding client. Retries and rate limiting are left to
/// [`crate::EmbeddingBatcher`].
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::Config {
                message: "API key is required for the embedding endpoint".to_string(),
            });
        }
        if config.dimension == 0 {
            return Err(EmbeddingError::Config {
                message: "embedding dimension must be positive".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cartograph/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            input: text,
            model: &self.config.model,
            dimensions: self.config.dimension,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::EmptyResponse)?;

        if embedding.len() != self.config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

impl EmbeddingService for OpenAiClient {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.request(text))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let err = OpenAiClient::new(OpenAiConfig::default()).err().unwrap();
        assert!(matches!(err, EmbeddingError::Config { .. }));
    }

    #[test]
    fn test_endpoint_and_request_shape() {
        let client = OpenAiClient::new(OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.endpoint, "http://localhost:8080/v1/embeddings");
        assert_eq!(client.dimension(), DEFAULT_DIMENSION);
        assert_eq!(client.model_name(), DEFAULT_MODEL);

        let body = serde_json::to_value(EmbeddingRequest {
            input: "fn main() {}",
            model: DEFAULT_MODEL,
            dimensions: 768,
            encoding_format: "float",
        })
        .unwrap();
        assert_eq!(body["dimensions"], 768);
        assert_eq!(body["encoding_format"], "float");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let client = OpenAiClient::new(OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Http(_)));
        assert!(err.is_retryable());
    }
}
