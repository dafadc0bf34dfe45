//! Reference documents (style guides, lint and compiler configs) loaded as
//! their own corpus and replaced on every run.

use carto_core::identity::OPAQUE_TYPE;
use carto_core::{DescriptorClass, GraphNode};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use super::loader::LoadError;
use crate::storage::{Corpus, GraphStore, StoreError};

/// One fetched document.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDoc {
    pub path: String,
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceDocsReport {
    pub requested: usize,
    pub fetched: usize,
    pub failed: Vec<FetchFailure>,
    pub wiped: usize,
    pub inserted: usize,
    pub statement_errors: usize,
}

/// Document path for `url`: whatever follows `marker` when it occurs in the
/// URL, otherwise the URL path.
pub fn doc_path(url: &str, marker: Option<&str>) -> String {
    if let Some(marker) = marker.filter(|m| !m.is_empty()) {
        if let Some(pos) = url.rfind(marker) {
            return url[pos + marker.len()..].to_string();
        }
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

/// The graph node stored for a document.
pub fn reference_node(doc: &ReferenceDoc) -> GraphNode {
    GraphNode {
        id: doc.path.clone(),
        name: doc.path.clone(),
        kind: "File".to_string(),
        descriptor: DescriptorClass::Styleguide,
        type_signature: OPAQUE_TYPE.to_string(),
        code: doc.text.clone(),
        comments: Vec::new(),
        file_path: doc.path.clone(),
        relations: Vec::new(),
        name_embedding: Vec::new(),
        code_embedding: Vec::new(),
        is_file: true,
    }
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    client.get(url).send().await?.error_for_status()?.text().await
}

/// Fetch every URL concurrently. Failures are logged and returned apart.
pub async fn fetch_reference_docs(
    client: &reqwest::Client,
    urls: &[String],
    marker: Option<&str>,
) -> (Vec<ReferenceDoc>, Vec<FetchFailure>) {
    let results = join_all(
        urls.iter()
            .map(|url| async move { (url, fetch_one(client, url).await) }),
    )
    .await;

    let mut docs = Vec::new();
    let mut failures = Vec::new();
    for (url, result) in results {
        match result {
            Ok(text) => docs.push(ReferenceDoc {
                path: doc_path(url, marker),
                url: url.clone(),
                text,
            }),
            Err(e) => {
                tracing::warn!("Failed to fetch reference document {}: {}", url, e);
                failures.push(FetchFailure {
                    url: url.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    (docs, failures)
}

/// Replace the reference corpus with `docs` in a single transaction. The
/// wipe happens even when `docs` is empty.
pub fn store_reference_docs(
    store: &dyn GraphStore,
    docs: &[ReferenceDoc],
) -> Result<ReferenceDocsReport, StoreError> {
    let mut report = ReferenceDocsReport::default();
    let mut tx = store.begin()?;
    report.wiped = tx.wipe(Corpus::Styleguide)?;

    for doc in docs {
        match tx.create_node(&reference_node(doc), Corpus::Styleguide) {
            Ok(true) => report.inserted += 1,
            Ok(false) => tracing::debug!("Reference document {} listed twice", doc.path),
            Err(e) => {
                report.statement_errors += 1;
                tracing::warn!("Failed to store reference document {}: {}", doc.path, e);
            }
        }
    }

    tx.commit()?;
    report.fetched = docs.len();
    Ok(report)
}

/// Fetch and store the reference documents.
pub async fn load_reference_docs(
    store: Arc<dyn GraphStore>,
    client: &reqwest::Client,
    urls: &[String],
    marker: Option<&str>,
) -> Result<ReferenceDocsReport, LoadError> {
    let (docs, failed) = fetch_reference_docs(client, urls, marker).await;
    tracing::info!("Fetched {}/{} reference documents", docs.len(), urls.len());

    let mut report =
        tokio::task::spawn_blocking(move || store_reference_docs(store.as_ref(), &docs))
        .await
        .map_err(|e| LoadError::Task(e.to_string()))??;

    report.requested = urls.len();
    report.failed = failed;
    Ok(report)
}
