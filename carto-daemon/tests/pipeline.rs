//! End-to-end pipeline tests: source tree -> DuckDB knowledge base.

use carto_core::{GraphNode, Relation, RelationKind};
use carto_daemon::build::{IngestPipeline, PipelineOptions};
use carto_daemon::config::CartoConfig;
use carto_daemon::ingest::batch_files::{list_batches, read_batch, EMBEDDED_DIR, PREPARED_DIR};
use carto_daemon::ingest::{store_reference_docs, ReferenceDoc};
use carto_daemon::storage::{Corpus, GraphStore, GraphTransaction, KnowledgeBase, StoreError};
use carto_embeddings::{BatcherConfig, EmbedFuture, EmbeddingBatcher, EmbeddingService, TokenBucket};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Embeds every text as `[len, 1, 0, 0]`.
struct FakeEmbeddings;

impl EmbeddingService for FakeEmbeddings {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move { Ok(vec![text.len() as f32, 1.0, 0.0, 0.0]) })
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

/// A store that is never reachable.
struct OfflineStore;

impl GraphStore for OfflineStore {
    fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// A knowledge base whose listed transactions (by begin order) refuse to
/// commit and roll back instead.
struct RefusingStore {
    kb: Arc<KnowledgeBase>,
    refuse: HashSet<usize>,
    begun: AtomicUsize,
}

impl RefusingStore {
    fn new(kb: &Arc<KnowledgeBase>, refuse: &[usize]) -> Self {
        Self {
            kb: kb.clone(),
            refuse: refuse.iter().copied().collect(),
            begun: AtomicUsize::new(0),
        }
    }
}

impl GraphStore for RefusingStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.kb.ping()
    }

    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>, StoreError> {
        let ordinal = self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RefusingTx {
            inner: self.kb.begin()?,
            refuse: self.refuse.contains(&ordinal),
        }))
    }
}

struct RefusingTx<'a> {
    inner: Box<dyn GraphTransaction + 'a>,
    refuse: bool,
}

impl GraphTransaction for RefusingTx<'_> {
    fn wipe(&mut self, corpus: Corpus) -> Result<usize, StoreError> {
        self.inner.wipe(corpus)
    }

    fn create_node(&mut self, node: &GraphNode, corpus: Corpus) -> Result<bool, StoreError> {
        self.inner.create_node(node, corpus)
    }

    fn create_relation(&mut self, source: &str, relation: &Relation) -> Result<bool, StoreError> {
        self.inner.create_relation(source, relation)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let RefusingTx { inner, refuse } = *self;
        if refuse {
            inner.rollback()?;
            return Err(StoreError::Other("commit refused".into()));
        }
        inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}

fn write_fixture(root: &Path) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("src/calls.ts"),
        "function g() {}\nfunction f() { g(); }\n",
    )
    .unwrap();
    std::fs::write(
        root.join("src/fact.ts"),
        "function fact(n: number): number {\n  return n <= 1 ? 1 : n * fact(n - 1);\n}\n",
    )
    .unwrap();
    std::fs::write(root.join("src/answer.js"), "export const answer = 42;\n").unwrap();
}

fn batcher() -> EmbeddingBatcher {
    EmbeddingBatcher::new(
        Arc::new(FakeEmbeddings),
        Arc::new(TokenBucket::new(10_000, Duration::from_secs(60))),
        BatcherConfig::default(),
    )
}

fn config(batch_size: usize, work_dir: Option<&str>) -> CartoConfig {
    let mut config = CartoConfig::default();
    config.ingest.batch_size = batch_size;
    config.ingest.files_per_step = 1;
    config.ingest.work_dir = work_dir.map(str::to_string);
    config
}

fn pipeline(kb: &Arc<KnowledgeBase>, config: CartoConfig) -> IngestPipeline {
    let store: Arc<dyn GraphStore> = kb.clone();
    IngestPipeline::new(
        config,
        store,
        Some(batcher()),
        PipelineOptions {
            embed: true,
            reference_docs: false,
            show_progress: false,
        },
    )
}

fn open_kb(dir: &TempDir, name: &str) -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::open(dir.path().join(name)).unwrap())
}

#[tokio::test]
async fn test_ingest_end_to_end() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");

    let summary = pipeline(&kb, config(500, None)).ingest(&root).await.unwrap();

    assert_eq!(summary.file_count, 3);
    assert_eq!(summary.failed_files, 0);
    assert_eq!(summary.load.nodes_created, summary.node_count);
    assert!(summary.load.failed_batches.is_empty());
    assert_eq!(summary.load.statement_errors, 0);

    let stats = kb.stats().unwrap();
    assert_eq!(stats.node_count, summary.node_count);
    assert_eq!(stats.descriptor_counts.get("File"), Some(&3));

    // f calls g
    let g = kb.get_node("src/calls.ts:g:1:1:2").unwrap().unwrap();
    assert!(g
        .relations
        .iter()
        .any(|r| r.kind == RelationKind::CalledBy && r.target == "src/calls.ts:f:2:2:2"));
    assert_eq!(g.name_embedding, vec![1.0, 1.0, 0.0, 0.0]);
    assert_eq!(g.code_embedding, vec![15.0, 1.0, 0.0, 0.0]);

    // fact calls itself exactly once
    let fact = kb.get_node("src/fact.ts:fact:1:3:2").unwrap().unwrap();
    let self_calls = fact
        .relations
        .iter()
        .filter(|r| r.target == fact.id)
        .count();
    assert_eq!(self_calls, 1);

    // File nodes carry no code, so their code embedding is the zero vector
    let file = kb.get_node("src/calls.ts").unwrap().unwrap();
    assert!(file.is_file);
    assert_eq!(file.code_embedding, vec![0.0; 4]);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");
    let pipeline = pipeline(&kb, config(2, None));

    let first = pipeline.ingest(&root).await.unwrap();
    let stats_first = kb.stats().unwrap();
    let second = pipeline.ingest(&root).await.unwrap();
    let stats_second = kb.stats().unwrap();

    assert_eq!(second.load.wiped, Some(first.node_count));
    assert_eq!(stats_first.node_count, stats_second.node_count);
    assert_eq!(stats_first.relation_count, stats_second.relation_count);
}

#[tokio::test]
async fn test_node_count_independent_of_batch_size() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);

    let mut counts = Vec::new();
    for batch_size in [1, 3, 1000] {
        let kb = open_kb(&dir, &format!("graph-{}.duckdb", batch_size));
        let summary = pipeline(&kb, config(batch_size, None))
            .ingest(&root)
            .await
            .unwrap();
        assert_eq!(
            summary.load.batches_total,
            summary.node_count.div_ceil(batch_size)
        );
        counts.push(kb.stats().unwrap().node_count);
    }
    assert!(counts.iter().all(|c| *c == counts[0]), "{:?}", counts);
}

#[tokio::test]
async fn test_work_dir_phases() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");
    let pipeline = pipeline(&kb, config(2, Some("work")));

    // One-shot ingest leaves both phases on disk
    let summary = pipeline.ingest(&root).await.unwrap();
    let prepared = root.join("work").join(PREPARED_DIR);
    let embedded = root.join("work").join(EMBEDDED_DIR);
    assert_eq!(list_batches(&prepared).unwrap().len(), summary.node_count.div_ceil(2));
    let first_embedded = read_batch(&list_batches(&embedded).unwrap()[0]).unwrap();
    assert!(first_embedded.iter().all(|n| n.is_embedded()));

    // Running the phases separately gives the same graph
    let phases = dir.path().join("phases");
    let report = pipeline.prepare(&root, &phases.join(PREPARED_DIR), 0).await.unwrap();
    assert_eq!(report.steps_total, 3);
    assert_eq!(report.node_count, summary.node_count);

    let embed = pipeline
        .embed_dir(&phases.join(PREPARED_DIR), &phases.join(EMBEDDED_DIR))
        .await
        .unwrap();
    assert_eq!(embed.nodes_embedded, summary.node_count);

    let kb2 = open_kb(&dir, "phases.duckdb");
    let load = self::pipeline(&kb2, config(2, None))
        .load_dir(&phases.join(EMBEDDED_DIR), 0)
        .await
        .unwrap();
    assert_eq!(load.nodes_created, summary.node_count);
    assert_eq!(kb2.stats().unwrap().node_count, kb.stats().unwrap().node_count);
}

#[tokio::test]
async fn test_prepare_resumes_from_step() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");
    let pipeline = pipeline(&kb, config(500, None));
    let out = dir.path().join(PREPARED_DIR);

    let full = pipeline.prepare(&root, &out, 0).await.unwrap();
    assert_eq!(full.steps_run, 3);
    assert_eq!(full.batch_files.len(), 3);

    // Redo the last step only: its batch is appended after the existing ones
    let resumed = pipeline.prepare(&root, &out, 2).await.unwrap();
    assert_eq!(resumed.steps_run, 1);
    assert_eq!(resumed.batch_files.len(), 1);
    assert!(resumed.batch_files[0].ends_with("batch-00004.json"));
    assert_eq!(list_batches(&out).unwrap().len(), 4);
}

#[tokio::test]
async fn test_unreachable_store_is_fatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);

    let pipeline = IngestPipeline::new(
        config(500, None),
        Arc::new(OfflineStore),
        Some(batcher()),
        PipelineOptions::default(),
    );
    let err = pipeline.ingest(&root).await.unwrap_err();
    assert!(format!("{:#}", err).contains("not reachable"));
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let kb = open_kb(&dir, "graph.duckdb");
    let result = pipeline(&kb, config(500, None))
        .ingest(&dir.path().join("missing"))
        .await;
    assert!(result.is_err());
    assert_eq!(kb.stats().unwrap().node_count, 0);
}

#[tokio::test]
async fn test_embed_dir_requires_batcher() {
    let dir = TempDir::new().unwrap();
    let kb = open_kb(&dir, "graph.duckdb");
    let store: Arc<dyn GraphStore> = kb.clone();
    let pipeline = IngestPipeline::new(config(500, None), store, None, PipelineOptions::default());

    let result = pipeline
        .embed_dir(&dir.path().join(PREPARED_DIR), &dir.path().join(EMBEDDED_DIR))
        .await;
    assert!(result.is_err());
}

#[test]
fn test_zero_reference_docs_still_wipe() {
    let dir = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(dir.path().join("graph.duckdb")).unwrap();

    let docs = vec![ReferenceDoc {
        path: "/.editorconfig".to_string(),
        url: "https://example.com/raw/develop/.editorconfig".to_string(),
        text: "root = true\n".to_string(),
    }];
    let first = store_reference_docs(&kb, &docs).unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(kb.stats().unwrap().corpus_counts.get("styleguide"), Some(&1));

    let second = store_reference_docs(&kb, &[]).unwrap();
    assert_eq!(second.wiped, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(kb.stats().unwrap().node_count, 0);
}

#[test]
fn test_reference_docs_leave_code_alone() {
    let dir = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(dir.path().join("graph.duckdb")).unwrap();

    let mut tx = kb.begin().unwrap();
    let code = carto_daemon::ingest::reference_docs::reference_node(&ReferenceDoc {
        path: "src/app.ts".to_string(),
        url: String::new(),
        text: String::new(),
    });
    tx.create_node(&code, Corpus::Code).unwrap();
    tx.commit().unwrap();

    store_reference_docs(&kb, &[]).unwrap();
    assert_eq!(kb.stats().unwrap().corpus_counts.get("code"), Some(&1));
}

fn with_reference_docs(store: Arc<dyn GraphStore>, config: CartoConfig) -> IngestPipeline {
    IngestPipeline::new(
        config,
        store,
        Some(batcher()),
        PipelineOptions {
            embed: true,
            reference_docs: true,
            show_progress: false,
        },
    )
}

fn offline_docs_config(batch_size: usize) -> CartoConfig {
    let mut config = config(batch_size, None);
    config.reference_docs.urls = Vec::new();
    config
}

#[tokio::test]
async fn test_refused_first_commit_keeps_previous_graph() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");
    let first = pipeline(&kb, config(2, None)).ingest(&root).await.unwrap();

    // Transaction 0 carries the wipe and the first batch
    let store: Arc<dyn GraphStore> = Arc::new(RefusingStore::new(&kb, &[0]));
    let summary = with_reference_docs(store, offline_docs_config(2))
        .ingest(&root)
        .await
        .unwrap();

    assert_eq!(summary.load.failed_batches.len(), 1);
    assert_eq!(summary.load.failed_batches[0].index, 0);
    assert!(summary.load.failed_batches[0].error.contains("commit refused"));
    assert_eq!(summary.load.wiped, None);
    assert!(summary.load.wipe_error.is_some());
    assert!(!summary.is_complete());
    // Later batches found their nodes from the previous run
    assert!(summary.load.nodes_existing > 0);
    assert_eq!(kb.stats().unwrap().corpus_counts.get("code"), Some(&first.node_count));
}

#[tokio::test]
async fn test_reference_docs_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");

    // Transaction 0 is the whole code load, 1 the reference documents
    let store: Arc<dyn GraphStore> = Arc::new(RefusingStore::new(&kb, &[1]));
    let summary = with_reference_docs(store, offline_docs_config(500))
        .ingest(&root)
        .await
        .unwrap();

    assert!(summary.load.is_complete());
    assert!(summary.reference_docs.is_none());
    assert!(summary
        .reference_docs_error
        .as_deref()
        .unwrap()
        .contains("commit refused"));
    assert!(!summary.is_complete());
    assert_eq!(kb.stats().unwrap().node_count, summary.node_count);
}

#[tokio::test]
async fn test_ingest_without_reference_urls_still_wipes_them() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    write_fixture(&root);
    let kb = open_kb(&dir, "graph.duckdb");
    let stale = ReferenceDoc {
        path: "/.prettierrc".to_string(),
        url: "https://example.com/raw/develop/.prettierrc".to_string(),
        text: "{}".to_string(),
    };
    store_reference_docs(&*kb, &[stale]).unwrap();

    let store: Arc<dyn GraphStore> = kb.clone();
    let summary = with_reference_docs(store, offline_docs_config(500))
        .ingest(&root)
        .await
        .unwrap();

    let docs = summary.reference_docs.as_ref().unwrap();
    assert_eq!(docs.requested, 0);
    assert_eq!(docs.wiped, 1);
    assert!(summary.is_complete());
    assert_eq!(kb.stats().unwrap().corpus_counts.get("styleguide"), None);
}
