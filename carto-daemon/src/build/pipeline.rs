//! Ingestion pipeline implementation.

use anyhow::{bail, Context, Result};
use carto_core::{
    build_files, build_project, scan_directory, Diagnostics, DiagnosticsReport, NodeSet,
};
use carto_embeddings::{EmbeddingBatcher, EmbeddingStats, OpenAiClient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::CartoConfig;
use crate::ingest::batch_files::{
    list_batches, read_all, reset_dir, write_batches, EMBEDDED_DIR, PREPARED_DIR,
};
use crate::ingest::{
    embed_batch_files, embed_nodes, load_blocking, load_reference_docs, EmbedPhaseReport,
    LoadError, LoadReport, LoaderConfig, ReferenceDocsReport,
};
use crate::storage::{Corpus, GraphStore};

/// Switches for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Fill embeddings before loading. Needs a batcher.
    pub embed: bool,
    /// Replace the reference-document corpus after the load.
    pub reference_docs: bool,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            embed: true,
            reference_docs: true,
            show_progress: false,
        }
    }
}

/// Result of a full ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub root: String,
    pub started_at: DateTime<Utc>,
    pub file_count: usize,
    pub failed_files: usize,
    pub node_count: usize,
    pub relation_count: usize,
    pub duration_ms: u64,
    pub embedding: Option<EmbeddingStats>,
    pub load: LoadReport,
    /// Set when the loader task itself failed; `load` is then empty.
    pub load_error: Option<String>,
    /// `None` when the step was switched off or failed.
    pub reference_docs: Option<ReferenceDocsReport>,
    pub reference_docs_error: Option<String>,
    pub diagnostics: DiagnosticsReport,
}

impl IngestSummary {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Everything loaded without a failed batch, statement or step.
    pub fn is_complete(&self) -> bool {
        self.load_error.is_none() && self.reference_docs_error.is_none() && self.load.is_complete()
    }
}

/// Result of the prepare phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrepareReport {
    pub steps_total: usize,
    pub steps_run: usize,
    pub file_count: usize,
    pub failed_files: usize,
    pub node_count: usize,
    pub relation_count: usize,
    pub batch_files: Vec<PathBuf>,
    pub diagnostics: DiagnosticsReport,
}

/// Pipeline from a source tree to the graph store.
#[derive(Clone)]
pub struct IngestPipeline {
    config: CartoConfig,
    store: Arc<dyn GraphStore>,
    batcher: Option<EmbeddingBatcher>,
    http: reqwest::Client,
    options: PipelineOptions,
}

impl IngestPipeline {
    pub fn new(
        config: CartoConfig,
        store: Arc<dyn GraphStore>,
        batcher: Option<EmbeddingBatcher>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            config,
            store,
            batcher,
            http: reqwest::Client::new(),
            options,
        }
    }

    /// Build the embedding batcher described by `config`, or `None` when
    /// embeddings are disabled. A missing API key is an error.
    pub fn batcher_from_config(config: &CartoConfig) -> Result<Option<EmbeddingBatcher>> {
        if !config.embeddings.enabled {
            return Ok(None);
        }
        let client = OpenAiClient::new(config.openai_config()?)
            .context("Failed to create embedding client")?;
        Ok(Some(EmbeddingBatcher::new(
            Arc::new(client),
            Arc::new(config.token_bucket()),
            config.batcher_config(),
        )))
    }

    pub fn config(&self) -> &CartoConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Counters of the embedding batcher, if there is one.
    pub fn embedding_stats(&self) -> Option<EmbeddingStats> {
        self.batcher.as_ref().map(EmbeddingBatcher::stats)
    }

    fn loader_config(&self, start_batch: usize) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.config.ingest.batch_size,
            start_batch,
            corpus: Corpus::Code,
            show_progress: self.options.show_progress,
        }
    }

    fn require_batcher(&self) -> Result<&EmbeddingBatcher> {
        match &self.batcher {
            Some(batcher) => Ok(batcher),
            None => bail!("Embeddings are disabled or not configured"),
        }
    }

    fn ping(&self) -> Result<()> {
        self.store.ping().context("Graph store is not reachable")
    }

    /// Run every phase on `root`: build, embed, load, reference documents.
    ///
    /// Only an unreachable store, a missing root or invalid configuration
    /// abort the run. Failed batches, statements and reference documents are
    /// reported in the summary.
    pub async fn ingest(&self, root: &Path) -> Result<IngestSummary> {
        let started_at = Utc::now();
        let start = Instant::now();

        if !root.is_dir() {
            bail!("Source root {:?} is not a directory", root);
        }
        self.ping()?;

        info!("Starting ingest from {:?}", root);

        // 1. Build
        let (mut nodes, graph_stats, diagnostics) = {
            let root = root.to_path_buf();
            let options = self.config.scan_options();
            let profile = self.config.tracking_profile()?;
            tokio::task::spawn_blocking(move || -> Result<_> {
                let diagnostics = Diagnostics::new();
                let graph = build_project(&root, &options, &profile, &diagnostics)
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("Failed to scan source root")?;
                let stats = graph.stats();
                Ok((graph.nodes, stats, diagnostics.into_report()))
            })
            .await
            .context("Build task failed")??
        };

        let work_dir = self.config.work_dir(root);
        if let Some(work_dir) = &work_dir {
            let prepared = work_dir.join(PREPARED_DIR);
            reset_dir(&prepared)?;
            write_batches(&prepared, nodes.as_slice(), self.config.ingest.batch_size, 1)?;
        }

        // 2. Embed
        let embedding = match (&self.batcher, self.options.embed) {
            (Some(batcher), true) => {
                info!("Embedding {} nodes with {}", nodes.len(), batcher.model_name());
                embed_nodes(
                    batcher,
                    nodes.as_mut_slice(),
                    self.config.embeddings.concurrency,
                )
                .await;
                Some(batcher.stats())
            }
            (None, true) => {
                warn!("No embedding service configured, loading nodes without embeddings");
                None
            }
            (_, false) => None,
        };

        if let Some(work_dir) = &work_dir {
            let embedded = work_dir.join(EMBEDDED_DIR);
            reset_dir(&embedded)?;
            write_batches(&embedded, nodes.as_slice(), self.config.ingest.batch_size, 1)?;
        }

        // 3. Load
        let (load, load_error) = match load_blocking(
            Arc::clone(&self.store),
            nodes.into_vec(),
            self.loader_config(0),
        )
        .await
        {
            Ok(report) => (report, None),
            Err(e @ LoadError::InvalidBatchSize) => {
                return Err(e).context("Invalid load configuration")
            }
            Err(e) => {
                error!("Load failed: {}", e);
                (LoadReport::default(), Some(e.to_string()))
            }
        };

        // 4. Reference documents
        let (reference_docs, reference_docs_error) = if self.options.reference_docs {
            match self.reference_docs().await {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    error!("Reference documents were not replaced: {:#}", e);
                    (None, Some(format!("{:#}", e)))
                }
            }
        } else {
            (None, None)
        };

        let summary = IngestSummary {
            root: root.display().to_string(),
            started_at,
            file_count: graph_stats.file_count,
            failed_files: graph_stats.failed_files,
            node_count: graph_stats.node_count,
            relation_count: graph_stats.relation_count,
            duration_ms: start.elapsed().as_millis() as u64,
            embedding,
            load,
            load_error,
            reference_docs,
            reference_docs_error,
            diagnostics,
        };

        info!(
            "Ingest complete: {} nodes, {} relations from {} files in {:?}",
            summary.node_count,
            summary.relation_count,
            summary.file_count,
            summary.duration()
        );
        Ok(summary)
    }

    /// Build `root` in steps of `files_per_step` files and write each step's
    /// nodes to batch files in `out_dir`. Steps before `start_from` are
    /// skipped and existing batch files are kept; `start_from == 0` starts
    /// from an empty directory.
    pub async fn prepare(&self, root: &Path, out_dir: &Path, start_from: usize) -> Result<PrepareReport> {
        if !root.is_dir() {
            bail!("Source root {:?} is not a directory", root);
        }

        let root = root.to_path_buf();
        let out_dir = out_dir.to_path_buf();
        let options = self.config.scan_options();
        let profile = self.config.tracking_profile()?;
        let files_per_step = self.config.ingest.files_per_step.max(1);
        let batch_size = self.config.ingest.batch_size;

        tokio::task::spawn_blocking(move || -> Result<PrepareReport> {
            let scan = scan_directory(&root, &options)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to scan source root")?;

            if start_from == 0 {
                reset_dir(&out_dir)?;
            } else {
                std::fs::create_dir_all(&out_dir)
                    .with_context(|| format!("Failed to create {:?}", out_dir))?;
            }

            let steps: Vec<_> = scan.files.chunks(files_per_step).collect();
            let mut report = PrepareReport {
                steps_total: steps.len(),
                ..Default::default()
            };
            let mut next_index = list_batches(&out_dir)?.len() + 1;
            let diagnostics = Diagnostics::new();

            for (step, files) in steps.iter().enumerate().skip(start_from) {
                info!(
                    "Preparing files {}-{} of {}",
                    step * files_per_step,
                    step * files_per_step + files.len(),
                    scan.files.len()
                );
                let graph = build_files(&root, files, &profile, &diagnostics);
                report.steps_run += 1;
                report.file_count += graph.file_count;
                report.failed_files += graph.failed_files;
                report.node_count += graph.nodes.len();
                report.relation_count += graph.nodes.relation_count();

                let written = write_batches(&out_dir, graph.nodes.as_slice(), batch_size, next_index)?;
                next_index += written.len();
                report.batch_files.extend(written);
            }

            report.diagnostics = diagnostics.into_report();
            info!(
                "Prepared {} nodes in {} batch files",
                report.node_count,
                report.batch_files.len()
            );
            Ok(report)
        })
        .await
        .context("Prepare task failed")?
    }

    /// Embed the batch files of `input_dir` into `output_dir`.
    pub async fn embed_dir(&self, input_dir: &Path, output_dir: &Path) -> Result<EmbedPhaseReport> {
        let batcher = self.require_batcher()?;
        embed_batch_files(
            batcher,
            input_dir,
            output_dir,
            self.config.embeddings.concurrency,
        )
        .await
    }

    /// Load every batch file of `dir`, starting at load batch `start_batch`.
    pub async fn load_dir(&self, dir: &Path, start_batch: usize) -> Result<LoadReport> {
        self.ping()?;
        let nodes: NodeSet = read_all(dir)?;
        if nodes.is_empty() {
            warn!("No nodes found in {:?}", dir);
        }
        let report = load_blocking(
            Arc::clone(&self.store),
            nodes.into_vec(),
            self.loader_config(start_batch),
        )
        .await?;
        Ok(report)
    }

    /// Replace the reference-document corpus. With no URLs configured the
    /// corpus is still wiped.
    pub async fn reference_docs(&self) -> Result<ReferenceDocsReport> {
        let docs = &self.config.reference_docs;
        self.ping()?;
        let report = load_reference_docs(
            Arc::clone(&self.store),
            &self.http,
            &docs.urls,
            docs.path_marker.as_deref(),
        )
        .await
        .context("Failed to store reference documents")?;
        Ok(report)
    }
}
