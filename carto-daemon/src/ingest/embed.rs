//! Embed phase: fill name and code embeddings of graph nodes.

use anyhow::Result;
use carto_core::GraphNode;
use carto_embeddings::EmbeddingBatcher;
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::batch_files::{batch_file_name, list_batches, read_batch, reset_dir, write_batch};

/// Result of embedding a directory of batch files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbedPhaseReport {
    pub input_files: usize,
    pub groups: usize,
    pub nodes_embedded: usize,
    pub nodes_already_embedded: usize,
    pub output_files: Vec<PathBuf>,
}

/// Fill both embeddings of every node that does not carry them yet, running
/// up to `concurrency` nodes at a time. Returns the number of nodes embedded.
///
/// Quota is enforced by the batcher's token bucket, not by this function.
pub async fn embed_nodes(
    batcher: &EmbeddingBatcher,
    nodes: &mut [GraphNode],
    concurrency: usize,
) -> usize {
    let dimension = batcher.dimension();
    let pending: Vec<&mut GraphNode> = nodes
        .iter_mut()
        .filter(|n| n.name_embedding.len() != dimension || n.code_embedding.len() != dimension)
        .collect();
    let count = pending.len();

    futures::stream::iter(pending)
        .for_each_concurrent(concurrency.max(1), |node| async move {
            let (name, code) = futures::join!(batcher.embed(&node.name), batcher.embed(&node.code));
            node.name_embedding = name;
            node.code_embedding = code;
        })
        .await;

    count
}

/// Embed every batch file of `input_dir` into `output_dir`.
///
/// Files are grouped so that one group needs at most one rate-limit window
/// of calls (a single file larger than a window forms its own group). Each
/// group is written to one output batch file.
pub async fn embed_batch_files(
    batcher: &EmbeddingBatcher,
    input_dir: &Path,
    output_dir: &Path,
    concurrency: usize,
) -> Result<EmbedPhaseReport> {
    let files = list_batches(input_dir)?;
    reset_dir(output_dir)?;

    let window = batcher.nodes_per_window();
    let mut report = EmbedPhaseReport {
        input_files: files.len(),
        ..Default::default()
    };

    let mut group: Vec<GraphNode> = Vec::new();
    for path in &files {
        let nodes = read_batch(path)?;
        if !group.is_empty() && group.len() + nodes.len() > window {
            flush_group(batcher, &mut group, output_dir, concurrency, &mut report).await?;
        }
        group.extend(nodes);
    }
    if !group.is_empty() {
        flush_group(batcher, &mut group, output_dir, concurrency, &mut report).await?;
    }

    tracing::info!(
        "Embedded {} nodes from {} files in {} groups",
        report.nodes_embedded,
        report.input_files,
        report.groups
    );
    Ok(report)
}

async fn flush_group(
    batcher: &EmbeddingBatcher,
    group: &mut Vec<GraphNode>,
    output_dir: &Path,
    concurrency: usize,
    report: &mut EmbedPhaseReport,
) -> Result<()> {
    report.groups += 1;
    tracing::info!("Embedding group {} ({} nodes)", report.groups, group.len());

    let embedded = embed_nodes(batcher, group, concurrency).await;
    report.nodes_embedded += embedded;
    report.nodes_already_embedded += group.len() - embedded;

    let path = output_dir.join(batch_file_name(report.groups));
    write_batch(&path, group)?;
    report.output_files.push(path);
    group.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::batch_files::write_batches;
    use carto_core::DescriptorClass;
    use carto_embeddings::{BatcherConfig, EmbedFuture, EmbeddingService, TokenBucket};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Returns `[len, 1.0]` for every text.
    struct LengthService {
        calls: AtomicUsize,
    }

    impl EmbeddingService for LengthService {
        fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![text.len() as f32, 1.0])
            })
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    fn batcher(service: Arc<LengthService>, calls_per_interval: u32) -> EmbeddingBatcher {
        EmbeddingBatcher::new(
            service,
            Arc::new(TokenBucket::new(calls_per_interval, Duration::from_secs(60))),
            BatcherConfig::default(),
        )
    }

    fn node(id: &str, code: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            name: id.to_string(),
            kind: "FunctionDeclaration".to_string(),
            descriptor: DescriptorClass::Function,
            type_signature: "any".to_string(),
            code: code.to_string(),
            comments: Vec::new(),
            file_path: "a.ts".to_string(),
            relations: Vec::new(),
            name_embedding: Vec::new(),
            code_embedding: Vec::new(),
            is_file: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_nodes_fills_both_vectors() {
        let service = Arc::new(LengthService {
            calls: AtomicUsize::new(0),
        });
        let batcher = batcher(Arc::clone(&service), 100);
        let mut nodes = vec![node("abc", "function abc() {}"), node("file.ts", "")];

        let embedded = embed_nodes(&batcher, &mut nodes, 4).await;
        assert_eq!(embedded, 2);
        assert_eq!(nodes[0].name_embedding, vec![3.0, 1.0]);
        assert_eq!(nodes[0].code_embedding, vec![17.0, 1.0]);
        // Empty code gets the zero vector without a call
        assert_eq!(nodes[1].code_embedding, vec![0.0, 0.0]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);

        // Second pass has nothing left to do
        assert_eq!(embed_nodes(&batcher, &mut nodes, 4).await, 0);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_files_grouped_per_window() {
        let service = Arc::new(LengthService {
            calls: AtomicUsize::new(0),
        });
        // 8 calls per window -> 4 nodes per group
        let batcher = batcher(Arc::clone(&service), 8);
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("prepared");
        let output = dir.path().join("embedded");

        let nodes: Vec<GraphNode> = (0..6).map(|i| node(&format!("n{}", i), "x")).collect();
        write_batches(&input, &nodes, 2, 1).unwrap();

        let report = embed_batch_files(&batcher, &input, &output, 8).await.unwrap();
        assert_eq!(report.input_files, 3);
        assert_eq!(report.groups, 2);
        assert_eq!(report.nodes_embedded, 6);
        assert_eq!(service.calls.load(Ordering::SeqCst), 12);

        let first = read_batch(&report.output_files[0]).unwrap();
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|n| n.is_embedded()));
        assert_eq!(list_batches(&output).unwrap().len(), 2);
    }
}
