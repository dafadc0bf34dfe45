//! KnowledgeBase - DuckDB-based storage for the knowledge graph.

use anyhow::{Context, Result};
use carto_core::{DescriptorClass, GraphNode, Relation, RelationKind};
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::graph_store::{GraphStore, GraphTransaction, StoreError};
use super::schema::{Corpus, SCHEMA_SQL, SCHEMA_VERSION};

const INSERT_NODE_SQL: &str = r#"
INSERT INTO nodes
    (id, corpus, descriptor, name, kind, type, code, comments, file_path, is_file, name_embedding, code_embedding)
SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
WHERE NOT EXISTS (SELECT 1 FROM nodes WHERE id = ?)
"#;

const INSERT_RELATION_SQL: &str = r#"
INSERT INTO relations (source_id, target_id, kind)
SELECT ?, ?, ?
WHERE EXISTS (SELECT 1 FROM nodes WHERE id = ?)
  AND EXISTS (SELECT 1 FROM nodes WHERE id = ?)
  AND NOT EXISTS (
      SELECT 1 FROM relations WHERE source_id = ? AND target_id = ? AND kind = ?
  )
"#;

/// KnowledgeBase - DuckDB-based storage for the knowledge graph.
pub struct KnowledgeBase {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

/// Counts reported by `carto status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeStats {
    pub node_count: usize,
    pub relation_count: usize,
    pub corpus_counts: BTreeMap<String, usize>,
    pub descriptor_counts: BTreeMap<String, usize>,
    pub relation_counts: BTreeMap<String, usize>,
    pub last_ingest: Option<String>,
}

impl KnowledgeBase {
    /// Open or create a knowledge base at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;

        let kb = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        };
        kb.init_schema()?;
        Ok(kb)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the database connection lock, recovering from a poisoned
    /// mutex: the connection itself stays usable after a panicking holder.
    fn acquire_conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Recovering from poisoned database mutex");
                poisoned.into_inner()
            }
        }
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.acquire_conn();

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize schema")?;

        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)",
            params![SCHEMA_VERSION],
        )
        .context("Failed to set schema version")?;

        Ok(())
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.acquire_conn();
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            params![key, value],
        )
        .with_context(|| format!("Failed to set metadata: {}", key))?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.acquire_conn();
        let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    /// Get a node by ID, with its outgoing relations.
    pub fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        let conn = self.acquire_conn();
        let mut stmt = conn.prepare(
            "SELECT id, descriptor, name, kind, type, code, comments, file_path, is_file,
                    name_embedding, code_embedding
             FROM nodes WHERE id = ? LIMIT 1",
        )?;
        let mut rows = stmt.query(params![id])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let descriptor: String = row.get(1)?;
        let comments: Option<String> = row.get(6)?;
        let name_embedding: Option<String> = row.get(9)?;
        let code_embedding: Option<String> = row.get(10)?;

        let mut node = GraphNode {
            id: row.get(0)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            descriptor: DescriptorClass::parse(&descriptor).unwrap_or_default(),
            type_signature: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            code: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            comments: parse_json_or_default(comments.as_deref()),
            file_path: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            relations: Vec::new(),
            name_embedding: parse_json_or_default(name_embedding.as_deref()),
            code_embedding: parse_json_or_default(code_embedding.as_deref()),
            is_file: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
        };
        drop(rows);
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT target_id, kind FROM relations WHERE source_id = ? ORDER BY kind, target_id",
        )?;
        let mut rows = stmt.query(params![id])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(1)?;
            if let Some(kind) = RelationKind::parse(&kind) {
                node.relations.push(Relation {
                    target: row.get(0)?,
                    kind,
                });
            }
        }

        Ok(Some(node))
    }

    /// Get graph statistics.
    pub fn stats(&self) -> Result<KnowledgeStats> {
        let mut stats = KnowledgeStats {
            last_ingest: self.get_metadata("last_ingest")?,
            ..Default::default()
        };

        let conn = self.acquire_conn();
        stats.node_count = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        stats.relation_count =
            conn.query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;

        for (sql, target) in [
            (
                "SELECT corpus, COUNT(*) FROM nodes GROUP BY corpus",
                &mut stats.corpus_counts,
            ),
            (
                "SELECT descriptor, COUNT(*) FROM nodes GROUP BY descriptor",
                &mut stats.descriptor_counts,
            ),
            (
                "SELECT kind, COUNT(*) FROM relations GROUP BY kind",
                &mut stats.relation_counts,
            ),
        ] {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let count: usize = row.get(1)?;
                target.insert(key, count);
            }
        }

        Ok(stats)
    }
}

fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(raw: Option<&str>) -> T {
    raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

impl GraphStore for KnowledgeBase {
    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.acquire_conn();
        let one: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        if one == 1 {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "unexpected ping answer from {:?}",
                self.path
            )))
        }
    }

    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>, StoreError> {
        Ok(Box::new(self.begin_duck()?))
    }
}

impl KnowledgeBase {
    pub(crate) fn begin_duck(&self) -> Result<DuckTransaction<'_>, StoreError> {
        let conn = self.acquire_conn();
        conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(DuckTransaction {
            conn,
            open: true,
            journal: Vec::new(),
            broken: None,
        })
    }
}

/// A statement that succeeded inside the current transaction.
struct Journaled {
    sql: &'static str,
    values: Vec<Value>,
}

/// A transaction holding the connection lock until it ends.
///
/// DuckDB aborts the whole transaction on the first failing statement, after
/// which every statement fails and COMMIT silently discards the work.
/// Successful statements are journaled; a failure rolls back, reopens the
/// transaction and replays the journal before the error is returned.
pub(crate) struct DuckTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
    journal: Vec<Journaled>,
    /// Set when the replay itself failed; the transaction can only be rolled back.
    broken: Option<String>,
}

impl DuckTransaction<'_> {
    pub(crate) fn execute(&mut self, sql: &'static str, values: Vec<Value>) -> Result<usize, StoreError> {
        if let Some(reason) = &self.broken {
            return Err(StoreError::Aborted(reason.clone()));
        }
        match self.conn.execute(sql, params_from_iter(values.iter())) {
            Ok(changed) => {
                self.journal.push(Journaled { sql, values });
                Ok(changed)
            }
            Err(e) => {
                if let Err(replay) = self.replay() {
                    tracing::warn!("Transaction could not be restored after a failed statement: {}", replay);
                    self.broken = Some(replay.to_string());
                }
                Err(e.into())
            }
        }
    }

    fn replay(&mut self) -> Result<(), duckdb::Error> {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::debug!("No transaction to roll back before replay: {}", e);
        }
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        for statement in &self.journal {
            self.conn
                .execute(statement.sql, params_from_iter(statement.values.iter()))?;
        }
        tracing::debug!("Replayed {} statements after a failed statement", self.journal.len());
        Ok(())
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

impl GraphTransaction for DuckTransaction<'_> {
    fn wipe(&mut self, corpus: Corpus) -> Result<usize, StoreError> {
        let corpus = corpus.as_str();
        self.execute(
            "DELETE FROM relations
             WHERE source_id IN (SELECT id FROM nodes WHERE corpus = ?)
                OR target_id IN (SELECT id FROM nodes WHERE corpus = ?)",
            vec![text(corpus), text(corpus)],
        )?;
        self.execute("DELETE FROM nodes WHERE corpus = ?", vec![text(corpus)])
    }

    fn create_node(&mut self, node: &GraphNode, corpus: Corpus) -> Result<bool, StoreError> {
        let comments = serde_json::to_string(&node.comments)?;
        let name_embedding = serde_json::to_string(&node.name_embedding)?;
        let code_embedding = serde_json::to_string(&node.code_embedding)?;

        let inserted = self.execute(
            INSERT_NODE_SQL,
            vec![
                text(&node.id),
                text(corpus.as_str()),
                text(node.descriptor.as_str()),
                text(&node.name),
                text(&node.kind),
                text(&node.type_signature),
                text(&node.code),
                Value::Text(comments),
                text(&node.file_path),
                Value::Boolean(node.is_file),
                Value::Text(name_embedding),
                Value::Text(code_embedding),
                text(&node.id),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn create_relation(&mut self, source: &str, relation: &Relation) -> Result<bool, StoreError> {
        let kind = relation.kind.as_str();
        let target = relation.target.as_str();
        let inserted = self.execute(
            INSERT_RELATION_SQL,
            [source, target, kind, source, target, source, target, kind]
                .into_iter()
                .map(text)
                .collect(),
        )?;
        Ok(inserted > 0)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.open = false;
        if let Some(reason) = self.broken.take() {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(StoreError::Aborted(reason));
        }
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.open = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for DuckTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::debug!("Rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}
