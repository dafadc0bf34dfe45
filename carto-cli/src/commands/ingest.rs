//! Ingest command - build, embed and load a source tree in one run

use anyhow::Result;
use carto_core::DiagnosticsReport;
use carto_daemon::IngestSummary;
use colored::Colorize;

use super::{GlobalOptions, Project};
use crate::commands::{docs, load};
use crate::output::{format_duration, Output, TableDisplay};

impl TableDisplay for IngestSummary {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();

        let title = if self.is_complete() {
            "Ingest complete".green().bold()
        } else {
            "Ingest finished with errors".yellow().bold()
        };
        lines.push(format!("{}", title));
        lines.push(format!("  {}: {}", "Root".cyan(), self.root));
        lines.push(format!(
            "  {}: {} ({} failed)",
            "Files".cyan(),
            self.file_count,
            self.failed_files
        ));
        lines.push(format!("  {}: {}", "Nodes".cyan(), self.node_count));
        lines.push(format!("  {}: {}", "Relations".cyan(), self.relation_count));

        match &self.embedding {
            Some(stats) => lines.push(format!(
                "  {}: {} embedded, {} empty, {} retries, {} failed",
                "Embeddings".cyan(),
                stats.embedded,
                stats.skipped_empty,
                stats.retries,
                stats.failed
            )),
            None => lines.push(format!("  {}: {}", "Embeddings".cyan(), "skipped".dimmed())),
        }

        match &self.load_error {
            Some(error) => lines.push(format!("  {}: {}", "Load failed".red().bold(), error)),
            None => lines.extend(load::report_lines(&self.load)),
        }
        if let Some(report) = &self.reference_docs {
            lines.extend(docs::report_lines(report));
        }
        if let Some(error) = &self.reference_docs_error {
            lines.push(format!(
                "  {}: {}",
                "Reference docs failed".red().bold(),
                error
            ));
        }
        lines.extend(diagnostic_lines(&self.diagnostics));

        lines.push(format!("\n{}", format!("({})", format_duration(self.duration_ms)).dimmed()));
        lines.join("\n")
    }
}

/// Summary lines for a non-clean diagnostics report.
pub fn diagnostic_lines(report: &DiagnosticsReport) -> Vec<String> {
    if report.is_clean() {
        return Vec::new();
    }

    let mut lines = vec![format!("  {}:", "Diagnostics".yellow())];
    if !report.file_failures.is_empty() {
        lines.push(format!("    {} files failed to parse", report.file_failures.len()));
    }
    if !report.resolution_failures.is_empty() {
        lines.push(format!(
            "    {} declarations failed to resolve",
            report.resolution_failures.len()
        ));
    }
    if !report.unknown_name_kinds.is_empty() {
        let kinds: Vec<_> = report.unknown_name_kinds.iter().map(String::as_str).collect();
        lines.push(format!("    unnamed kinds: {}", kinds.join(", ")));
    }
    if !report.unhandled_reference_kinds.is_empty() {
        let kinds: Vec<_> = report
            .unhandled_reference_kinds
            .iter()
            .map(String::as_str)
            .collect();
        lines.push(format!("    unhandled references: {}", kinds.join(", ")));
    }
    lines
}

/// Run the ingest command.
pub async fn run(path: &str, no_embed: bool, no_docs: bool, global: &GlobalOptions) -> Result<()> {
    let project = Project::load(path, global)?;
    let kb = project.open_kb()?;
    let pipeline = project.pipeline(&kb, !no_embed, !no_docs, global)?;

    if global.show_progress() {
        eprintln!(
            "{} {}",
            "Ingesting".cyan().bold(),
            project.root.display()
        );
    }

    let summary = pipeline.ingest(&project.root).await?;

    if let Err(e) = kb.set_metadata("last_ingest", &summary.started_at.to_rfc3339()) {
        tracing::warn!("Failed to record ingest time: {}", e);
    }

    Output::new(summary, global.format).render()
}
