//! Cartograph core - graph construction for code knowledge graphs.
//!
//! This crate turns source files into a deduplicated set of graph nodes and
//! edges, ready to be embedded and loaded by `carto-daemon`.
//!
//! # Features
//!
//! - **Gitignore-aware scanning**: find TypeScript/JavaScript sources
//! - **Tree-sitter symbol provider**: syntax plus file-local name resolution
//! - **Deterministic identity**: stable node IDs across runs
//! - **Relation resolution**: `IN_FILE`, `LOCAL_OF`, `CALLED_BY`, `USED_IN`
//! - **Parallel builds**: one node set per file, merged in scan order
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use carto_core::{build_project, Diagnostics, ScanOptions, TrackingProfile};
//!
//! let diagnostics = Diagnostics::new();
//! let graph = build_project(
//!     Path::new("."),
//!     &ScanOptions::default(),
//!     &TrackingProfile::default(),
//!     &diagnostics,
//! )
//! .expect("scan failed");
//! println!("{} nodes", graph.nodes.len());
//! ```

pub mod diagnostics;
pub mod identity;
pub mod kinds;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod symbols;

pub use diagnostics::{Diagnostics, DiagnosticsReport};
pub use identity::{build_node, identify};
pub use kinds::{SyntaxKind, TrackingProfile, TRACKING_PROFILE_VERSION};
pub use model::{classify, DescriptorClass, GraphNode, NodeSet, Relation, RelationKind};
pub use resolver::{build_file, build_files, build_project, BuildStats, ProjectGraph};
pub use scanner::{scan_directory, ScanOptions, ScanResult, ScannedFile, DEFAULT_IGNORE_PATTERNS};
pub use symbols::{Reference, ReferenceShape, ResolveError, SymbolProvider};

/// Get the version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
