//! Collects the non-fatal problems seen while building a graph.
//!
//! A single `Diagnostics` is shared (by reference) across the parallel
//! per-file builds of one run and turned into a `DiagnosticsReport` at the
//! end. Nothing here is process-global.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// One declaration whose references or locals could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub file_path: String,
    pub node_id: String,
    pub message: String,
}

/// One file that could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file_path: String,
    pub message: String,
}

/// Snapshot of everything recorded during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Kinds that fell through to the qualified-name fallback when naming.
    pub unknown_name_kinds: BTreeSet<String>,
    /// Reference shapes the resolver does not turn into edges.
    pub unhandled_reference_kinds: BTreeSet<String>,
    pub resolution_failures: Vec<ResolutionFailure>,
    pub file_failures: Vec<FileFailure>,
}

impl DiagnosticsReport {
    pub fn is_clean(&self) -> bool {
        self.unknown_name_kinds.is_empty()
            && self.unhandled_reference_kinds.is_empty()
            && self.resolution_failures.is_empty()
            && self.file_failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    inner: Mutex<DiagnosticsReport>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut DiagnosticsReport) -> R) -> R {
        // A panic in another builder thread must not hide what was recorded
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn record_unknown_name_kind(&self, kind: &str) {
        self.with(|r| {
            if !r.unknown_name_kinds.contains(kind) {
                r.unknown_name_kinds.insert(kind.to_string());
            }
        });
    }

    pub fn record_unhandled_reference(&self, kind: &str) {
        self.with(|r| {
            if !r.unhandled_reference_kinds.contains(kind) {
                r.unhandled_reference_kinds.insert(kind.to_string());
            }
        });
    }

    pub fn record_resolution_failure(&self, file_path: &str, node_id: &str, message: impl Into<String>) {
        let failure = ResolutionFailure {
            file_path: file_path.to_string(),
            node_id: node_id.to_string(),
            message: message.into(),
        };
        self.with(|r| r.resolution_failures.push(failure));
    }

    pub fn record_file_failure(&self, file_path: &str, message: impl Into<String>) {
        let failure = FileFailure {
            file_path: file_path.to_string(),
            message: message.into(),
        };
        self.with(|r| r.file_failures.push(failure));
    }

    /// Copy of everything recorded so far.
    pub fn report(&self) -> DiagnosticsReport {
        self.with(|r| r.clone())
    }

    /// Consume the sink and return its contents.
    pub fn into_report(self) -> DiagnosticsReport {
        self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_records_are_deduplicated_per_kind() {
        let diag = Diagnostics::new();
        diag.record_unknown_name_kind("BindingElement");
        diag.record_unknown_name_kind("BindingElement");
        diag.record_unhandled_reference("ExportSpecifier");

        let report = diag.report();
        assert_eq!(report.unknown_name_kinds.len(), 1);
        assert!(report.unhandled_reference_kinds.contains("ExportSpecifier"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_concurrent_recording() {
        let diag = Arc::new(Diagnostics::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let diag = Arc::clone(&diag);
                thread::spawn(move || {
                    diag.record_file_failure(&format!("f{}.ts", i), "syntax error");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(diag.report().file_failures.len(), 8);
    }

    #[test]
    fn test_empty_report_is_clean() {
        assert!(Diagnostics::new().into_report().is_clean());
    }
}
