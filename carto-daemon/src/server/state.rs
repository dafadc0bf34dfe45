//! Shared application state for the server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::build::IngestPipeline;
use crate::storage::KnowledgeBase;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Pipeline run by `POST /ingest`
    pub pipeline: IngestPipeline,
    /// Database behind the pipeline, for status queries
    pub kb: Arc<KnowledgeBase>,
    /// Root ingested when a request names no path
    pub root: PathBuf,
    /// Held for the duration of an ingest; one ingest at a time
    pub ingest_lock: Arc<Mutex<()>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: IngestPipeline, kb: Arc<KnowledgeBase>, root: PathBuf) -> Self {
        Self {
            pipeline,
            kb,
            root,
            ingest_lock: Arc::new(Mutex::new(())),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Resolve a requested path against the default root.
    pub fn resolve_root(&self, requested: Option<&str>) -> PathBuf {
        match requested {
            Some(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path);
                if path.is_absolute() {
                    path
                } else {
                    self.root.join(path)
                }
            }
            _ => self.root.clone(),
        }
    }
}
