//! Intermediate batch files between the prepare, embed and load phases.
//!
//! Each file is a JSON object keyed by node ID whose values are full
//! [`GraphNode`] records:
//!
//! ```json
//! {
//!   "src/app.ts": { "id": "src/app.ts", "name": "app.ts", ... },
//!   "src/app.ts:main:1:3:2": { "id": "src/app.ts:main:1:3:2", ... }
//! }
//! ```
//!
//! Key order is the node insertion order and survives a write/read cycle.

use anyhow::{Context, Result};
use carto_core::{GraphNode, NodeSet};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Sub-directory of the work directory holding freshly built batches.
pub const PREPARED_DIR: &str = "prepared";

/// Sub-directory of the work directory holding embedded batches.
pub const EMBEDDED_DIR: &str = "embedded";

const BATCH_PREFIX: &str = "batch-";
const BATCH_SUFFIX: &str = ".json";

/// File name of the `index`-th batch (1-based).
pub fn batch_file_name(index: usize) -> String {
    format!("{}{:05}{}", BATCH_PREFIX, index, BATCH_SUFFIX)
}

/// The nodes of one batch file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchFile {
    pub nodes: Vec<GraphNode>,
}

impl Serialize for BatchFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.nodes.iter().map(|node| (&node.id, node)))
    }
}

impl<'de> Deserialize<'de> for BatchFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BatchVisitor;

        impl<'de> Visitor<'de> for BatchVisitor {
            type Value = BatchFile;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of graph nodes keyed by id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<BatchFile, A::Error> {
                let mut nodes = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, mut node)) = map.next_entry::<String, GraphNode>()? {
                    if node.id.is_empty() {
                        node.id = key;
                    }
                    nodes.push(node);
                }
                Ok(BatchFile { nodes })
            }
        }

        deserializer.deserialize_map(BatchVisitor)
    }
}

/// Write one batch file.
pub fn write_batch(path: &Path, nodes: &[GraphNode]) -> Result<()> {
    let batch = BatchFile {
        nodes: nodes.to_vec(),
    };
    let content = serde_json::to_string_pretty(&batch)
        .with_context(|| format!("Failed to serialize batch {:?}", path))?;
    fs::write(path, content).with_context(|| format!("Failed to write batch {:?}", path))?;
    tracing::debug!("Wrote {} nodes to {:?}", nodes.len(), path);
    Ok(())
}

/// Read one batch file.
pub fn read_batch(path: &Path) -> Result<Vec<GraphNode>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read batch {:?}", path))?;
    let batch: BatchFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch {:?}", path))?;
    Ok(batch.nodes)
}

/// Split `nodes` into files of at most `batch_size` nodes, numbered from
/// `first_index`. Returns the written paths.
pub fn write_batches(
    dir: &Path,
    nodes: &[GraphNode],
    batch_size: usize,
    first_index: usize,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let mut written = Vec::new();
    for (offset, chunk) in nodes.chunks(batch_size.max(1)).enumerate() {
        let path = dir.join(batch_file_name(first_index + offset));
        write_batch(&path, chunk)?;
        written.push(path);
    }
    Ok(written)
}

/// Batch files in `dir`, sorted by name. A missing directory has none.
pub fn list_batches(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BATCH_PREFIX) && n.ends_with(BATCH_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Read every batch in `dir` into one node set, in file order.
pub fn read_all(dir: &Path) -> Result<NodeSet> {
    let mut set = NodeSet::new();
    for path in list_batches(dir)? {
        let nodes = read_batch(&path)?;
        let total = nodes.len();
        let added = set.merge(nodes.into_iter().collect());
        if added < total {
            tracing::warn!("{:?} repeated {} node IDs", path, total - added);
        }
    }
    Ok(set)
}

/// Remove `dir` and everything in it, then recreate it empty.
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("Failed to clear {:?}", dir))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_core::{DescriptorClass, Relation, RelationKind};
    use tempfile::TempDir;

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            name: id.to_string(),
            kind: "VariableDeclaration".to_string(),
            descriptor: DescriptorClass::Variable,
            type_signature: "any".to_string(),
            code: format!("{} = 1", id),
            comments: Vec::new(),
            file_path: "a.ts".to_string(),
            relations: vec![Relation {
                target: "a.ts".to_string(),
                kind: RelationKind::InFile,
            }],
            name_embedding: Vec::new(),
            code_embedding: Vec::new(),
            is_file: false,
        }
    }

    #[test]
    fn test_batch_file_name() {
        assert_eq!(batch_file_name(1), "batch-00001.json");
        assert_eq!(batch_file_name(123), "batch-00123.json");
    }

    #[test]
    fn test_batch_keeps_order_and_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(batch_file_name(1));
        let nodes = vec![node("zeta"), node("alpha"), node("mid")];
        write_batch(&path, &nodes).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["alpha"]["code"], "alpha = 1");
        assert_eq!(raw["alpha"]["relations"][0]["kind"], "IN_FILE");

        let ids: Vec<String> = read_batch(&path).unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_write_batches_splits_and_lists() {
        let dir = TempDir::new().unwrap();
        let nodes: Vec<GraphNode> = (0..5).map(|i| node(&format!("n{}", i))).collect();

        let written = write_batches(dir.path(), &nodes, 2, 1).unwrap();
        assert_eq!(written.len(), 3);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = list_batches(dir.path()).unwrap();
        assert_eq!(listed, written);

        let all = read_all(dir.path()).unwrap();
        let ids: Vec<&str> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n0", "n1", "n2", "n3", "n4"]);
    }

    #[test]
    fn test_missing_dir_has_no_batches() {
        let dir = TempDir::new().unwrap();
        assert!(list_batches(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_reset_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join(PREPARED_DIR);
        write_batches(&target, &[node("a")], 10, 1).unwrap();
        reset_dir(&target).unwrap();
        assert!(target.exists());
        assert!(list_batches(&target).unwrap().is_empty());
    }
}
