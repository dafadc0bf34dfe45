//! Load command - write batch files into the graph database

use anyhow::Result;
use carto_daemon::ingest::batch_files::EMBEDDED_DIR;
use carto_daemon::ingest::LoadReport;
use colored::Colorize;

use super::{GlobalOptions, Project};
use crate::output::{format_duration, Output, TableDisplay};

/// Summary lines shared by `load` and `ingest`.
pub fn report_lines(report: &LoadReport) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "  {}: {}/{} batches ({} skipped)",
        "Load".cyan(),
        report.batches_loaded,
        report.batches_total,
        report.batches_skipped
    ));
    if let Some(wiped) = report.wiped {
        lines.push(format!("    replaced {} previous nodes", wiped));
    }
    if let Some(error) = &report.wipe_error {
        lines.push(format!(
            "    {} previous nodes kept: {}",
            "WIPE FAILED".red().bold(),
            error
        ));
    }
    lines.push(format!(
        "    {} nodes created, {} already present",
        report.nodes_created, report.nodes_existing
    ));
    lines.push(format!(
        "    {} relations created, {} unmatched",
        report.relations_created, report.relations_unmatched
    ));
    if report.statement_errors > 0 {
        lines.push(format!(
            "    {}",
            format!("{} statements failed", report.statement_errors).yellow()
        ));
    }
    for failed in &report.failed_batches {
        lines.push(format!(
            "    {} batch {} ({} nodes): {}",
            "FAILED".red().bold(),
            failed.index,
            failed.nodes,
            failed.error
        ));
    }
    if let Some(first) = report.failed_batches.first() {
        lines.push(format!(
            "    {} carto load --start-batch {}",
            "Resume with:".yellow(),
            first.index
        ));
    }
    lines
}

impl TableDisplay for LoadReport {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();
        let title = if self.is_complete() {
            "Load complete".green().bold()
        } else {
            "Load finished with errors".yellow().bold()
        };
        lines.push(format!("{}", title));
        lines.extend(report_lines(self));
        lines.push(format!("\n{}", format!("({})", format_duration(self.duration_ms)).dimmed()));
        lines.join("\n")
    }
}

/// Run the load command.
///
/// `start_batch == 0` replaces the code corpus; a later start resumes an
/// interrupted load without wiping.
pub async fn run(
    path: &str,
    input: Option<&str>,
    start_batch: usize,
    global: &GlobalOptions,
) -> Result<()> {
    let project = Project::load(path, global)?;
    let input = project.phase_dir(input, EMBEDDED_DIR);
    let kb = project.open_kb()?;
    let pipeline = project.pipeline(&kb, false, false, global)?;

    let report = pipeline.load_dir(&input, start_batch).await?;

    Output::new(report, global.format).render()
}
