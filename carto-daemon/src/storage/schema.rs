//! Database schema definitions for the knowledge graph.
//!
//! Defines the corpora a node can belong to and the DuckDB schema.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent node populations. A wipe only ever touches one corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    /// Nodes built from the ingested source tree.
    #[default]
    Code,
    /// Reference (style guide) documents.
    Styleguide,
}

impl Corpus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Code => "code",
            Corpus::Styleguide => "styleguide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "code" => Some(Corpus::Code),
            "styleguide" => Some(Corpus::Styleguide),
            _ => None,
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// SQL schema for creating the knowledge-graph tables.
///
/// Node and relation uniqueness is enforced by the insert statements rather
/// than by key constraints: DuckDB checks unique constraints against rows
/// deleted earlier in the same transaction, which would break a wipe and
/// reload done in one transaction.
pub const SCHEMA_SQL: &str = r#"
-- Nodes table: declarations, files and reference documents
CREATE TABLE IF NOT EXISTS nodes (
    id VARCHAR NOT NULL,
    corpus VARCHAR NOT NULL,
    descriptor VARCHAR NOT NULL,
    name VARCHAR NOT NULL,
    kind VARCHAR NOT NULL,
    type VARCHAR,
    code VARCHAR,
    comments VARCHAR,
    file_path VARCHAR,
    is_file BOOLEAN DEFAULT FALSE,
    name_embedding VARCHAR,
    code_embedding VARCHAR,
    loaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

-- Relations table: directed edges between node ids
CREATE TABLE IF NOT EXISTS relations (
    source_id VARCHAR NOT NULL,
    target_id VARCHAR NOT NULL,
    kind VARCHAR NOT NULL
);

-- Metadata table: version, ingest info
CREATE TABLE IF NOT EXISTS metadata (
    key VARCHAR PRIMARY KEY,
    value VARCHAR
);

-- Indexes for common queries
CREATE INDEX IF NOT EXISTS idx_nodes_id ON nodes(id);
CREATE INDEX IF NOT EXISTS idx_nodes_corpus ON nodes(corpus);
CREATE INDEX IF NOT EXISTS idx_nodes_descriptor ON nodes(descriptor);
CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file_path);
CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id);
CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);
CREATE INDEX IF NOT EXISTS idx_relations_kind ON relations(kind);
"#;

/// Schema version for migrations
pub const SCHEMA_VERSION: &str = "1.0.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_roundtrip() {
        for corpus in [Corpus::Code, Corpus::Styleguide] {
            assert_eq!(Corpus::parse(corpus.as_str()), Some(corpus));
        }
        assert_eq!(Corpus::parse("Styleguide"), Some(Corpus::Styleguide));
        assert_eq!(Corpus::parse("docs"), None);
    }
}
