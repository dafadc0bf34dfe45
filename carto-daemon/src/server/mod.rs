//! HTTP trigger for the ingestion pipeline.
//!
//! Provides:
//! - `GET /health`
//! - `GET /status` (graph counts)
//! - `POST /ingest`

mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
