//! Ingestion loader: chunked, transactional, resumable graph load.

use carto_core::GraphNode;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::storage::{Corpus, GraphStore, StoreError};

/// Default number of nodes per load transaction.
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("loader task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Nodes per transaction.
    pub batch_size: usize,
    /// First batch to load. Anything above 0 skips the wipe.
    pub start_batch: usize,
    pub corpus: Corpus,
    pub show_progress: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_LOAD_BATCH_SIZE,
            start_batch: 0,
            corpus: Corpus::Code,
            show_progress: false,
        }
    }
}

/// A batch whose transaction did not commit.
#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub index: usize,
    pub nodes: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub batches_total: usize,
    pub batches_skipped: usize,
    pub batches_loaded: usize,
    pub failed_batches: Vec<FailedBatch>,
    /// Nodes removed by the wipe, `None` when resuming or when the wipe
    /// did not commit.
    pub wiped: Option<usize>,
    /// Why the requested wipe did not take effect.
    pub wipe_error: Option<String>,
    pub nodes_created: usize,
    /// Nodes whose ID was already stored.
    pub nodes_existing: usize,
    pub relations_created: usize,
    /// Relations skipped because an endpoint is not in the graph.
    pub relations_unmatched: usize,
    pub statement_errors: usize,
    /// Progress units: nodes and relations of the loaded batches, plus one
    /// for the wipe.
    pub units_total: u64,
    pub duration_ms: u64,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty() && self.statement_errors == 0 && self.wipe_error.is_none()
    }
}

#[derive(Debug, Default)]
struct BatchCounts {
    wiped: Option<usize>,
    nodes_created: usize,
    nodes_existing: usize,
    relations_created: usize,
    relations_unmatched: usize,
}

/// Number of batches `nodes` splits into.
pub fn batch_count(nodes: usize, batch_size: usize) -> usize {
    nodes.div_ceil(batch_size.max(1))
}

/// Loads a node set into a [`GraphStore`], one transaction per batch.
pub struct GraphLoader<'a> {
    store: &'a dyn GraphStore,
    config: LoaderConfig,
}

impl<'a> GraphLoader<'a> {
    pub fn new(store: &'a dyn GraphStore, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// Load `nodes`. Batch and wipe failures are recorded in the report;
    /// only an invalid configuration returns an error.
    ///
    /// A full rebuild wipes the corpus inside the first batch's transaction,
    /// so a load takes exactly `batch_count` transactions and a failed first
    /// batch leaves the previous graph in place.
    pub fn load(&self, nodes: &[GraphNode]) -> Result<LoadReport, LoadError> {
        if self.config.batch_size == 0 {
            return Err(LoadError::InvalidBatchSize);
        }

        let start = Instant::now();
        let batches: Vec<&[GraphNode]> = nodes.chunks(self.config.batch_size).collect();
        let start_batch = self.config.start_batch.min(batches.len());
        let wipe = self.config.start_batch == 0;

        if self.config.start_batch > batches.len() {
            tracing::warn!(
                "Start batch {} is past the last batch ({}), nothing to load",
                self.config.start_batch,
                batches.len()
            );
        }

        let mut report = LoadReport {
            batches_total: batches.len(),
            batches_skipped: start_batch,
            ..Default::default()
        };
        report.units_total = batches[start_batch..]
            .iter()
            .flat_map(|batch| batch.iter())
            .map(|node| 1 + node.relations.len() as u64)
            .sum::<u64>()
            + u64::from(wipe);

        let progress = self.progress_bar(report.units_total);

        if !wipe {
            tracing::info!("Resuming load at batch {}", start_batch);
        } else if batches.is_empty() {
            // Nothing to load, the wipe still replaces the corpus
            match self.wipe_alone() {
                Ok(removed) => report.wiped = Some(removed),
                Err(e) => {
                    tracing::error!("Failed to wipe the {} corpus: {}", self.config.corpus, e);
                    report.wipe_error = Some(e.to_string());
                }
            }
            progress.inc(1);
        }

        for (index, batch) in batches.iter().enumerate().skip(start_batch) {
            progress.set_message(format!("batch {}/{}", index + 1, batches.len()));
            let wipe_here = wipe && index == 0;
            match self.load_batch(index, batch, wipe_here, &progress, &mut report) {
                Ok(counts) => {
                    report.batches_loaded += 1;
                    report.nodes_created += counts.nodes_created;
                    report.nodes_existing += counts.nodes_existing;
                    report.relations_created += counts.relations_created;
                    report.relations_unmatched += counts.relations_unmatched;
                    if let Some(removed) = counts.wiped {
                        tracing::info!("Wiped {} {} nodes", removed, self.config.corpus);
                        report.wiped = Some(removed);
                    }
                }
                Err(e) => {
                    tracing::error!("Batch {} rolled back: {}", index, e);
                    if wipe_here && report.wipe_error.is_none() {
                        report.wipe_error = Some(format!("rolled back with batch {}: {}", index, e));
                    }
                    report.failed_batches.push(FailedBatch {
                        index,
                        nodes: batch.len(),
                        error: e.to_string(),
                    });
                }
            }
        }

        progress.finish_and_clear();
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Loaded {}/{} batches: {} nodes, {} relations ({} unmatched, {} statement errors)",
            report.batches_loaded,
            report.batches_total - report.batches_skipped,
            report.nodes_created,
            report.relations_created,
            report.relations_unmatched,
            report.statement_errors
        );
        Ok(report)
    }

    fn wipe_alone(&self) -> Result<usize, StoreError> {
        let mut tx = self.store.begin()?;
        let removed = tx.wipe(self.config.corpus)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Optionally wipe the corpus, create every node of the batch, then every
    /// relation sourced in it, and commit. Statement errors are counted and
    /// do not stop the batch.
    fn load_batch(
        &self,
        index: usize,
        batch: &[GraphNode],
        wipe: bool,
        progress: &ProgressBar,
        report: &mut LoadReport,
    ) -> Result<BatchCounts, StoreError> {
        let mut tx = self.store.begin()?;
        let mut counts = BatchCounts::default();

        if wipe {
            match tx.wipe(self.config.corpus) {
                Ok(removed) => counts.wiped = Some(removed),
                Err(e) => {
                    tracing::error!("Failed to wipe the {} corpus: {}", self.config.corpus, e);
                    report.wipe_error = Some(e.to_string());
                }
            }
            progress.inc(1);
        }

        for node in batch {
            match tx.create_node(node, self.config.corpus) {
                Ok(true) => counts.nodes_created += 1,
                Ok(false) => counts.nodes_existing += 1,
                Err(e) => {
                    report.statement_errors += 1;
                    tracing::warn!(
                        "Batch {}: failed to create node {} ({} in {}): {}",
                        index,
                        node.id,
                        node.kind,
                        node.file_path,
                        e
                    );
                    tracing::debug!(
                        "Node payload: {}",
                        serde_json::to_string(node).unwrap_or_default()
                    );
                }
            }
            progress.inc(1);
        }

        for node in batch {
            for relation in &node.relations {
                match tx.create_relation(&node.id, relation) {
                    Ok(true) => counts.relations_created += 1,
                    Ok(false) => counts.relations_unmatched += 1,
                    Err(e) => {
                        report.statement_errors += 1;
                        tracing::warn!(
                            "Batch {}: failed to create {} {} -> {}: {}",
                            index,
                            relation.kind,
                            node.id,
                            relation.target,
                            e
                        );
                    }
                }
                progress.inc(1);
            }
        }

        tx.commit()?;
        Ok(counts)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("Loading {msg} [{bar:40.cyan/blue}] {percent}% | {pos}/{len} | {elapsed}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }
}

/// Run [`GraphLoader::load`] on a blocking thread.
pub async fn load_blocking(
    store: Arc<dyn GraphStore>,
    nodes: Vec<GraphNode>,
    config: LoaderConfig,
) -> Result<LoadReport, LoadError> {
    tokio::task::spawn_blocking(move || GraphLoader::new(store.as_ref(), config).load(&nodes))
        .await
        .map_err(|e| LoadError::Task(e.to_string()))?
}
