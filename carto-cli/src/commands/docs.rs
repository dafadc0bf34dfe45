//! Docs command - reload the reference-document corpus

use anyhow::Result;
use carto_daemon::ingest::ReferenceDocsReport;
use colored::Colorize;

use super::{create_spinner, GlobalOptions, Project};
use crate::output::{Notice, Output, OutputFormat, TableDisplay};

/// Summary lines shared by `docs` and `ingest`.
pub fn report_lines(report: &ReferenceDocsReport) -> Vec<String> {
    let mut lines = vec![format!(
        "  {}: {}/{} fetched, {} stored, {} replaced",
        "Reference docs".cyan(),
        report.fetched,
        report.requested,
        report.inserted,
        report.wiped
    )];
    for failure in &report.failed {
        lines.push(format!(
            "    {} {}: {}",
            "FAILED".red().bold(),
            failure.url,
            failure.error
        ));
    }
    if report.statement_errors > 0 {
        lines.push(format!(
            "    {}",
            format!("{} statements failed", report.statement_errors).yellow()
        ));
    }
    lines
}

impl TableDisplay for ReferenceDocsReport {
    fn to_table(&self) -> String {
        let mut lines = vec![format!("{}", "Reference documents reloaded".green().bold())];
        lines.extend(report_lines(self));
        lines.join("\n")
    }
}

/// Run the docs command.
pub async fn run(path: &str, global: &GlobalOptions) -> Result<()> {
    let project = Project::load(path, global)?;
    if project.config.reference_docs.urls.is_empty() && global.format == OutputFormat::Table {
        Output::new(
            Notice::new("No reference documents configured; clearing the reference corpus"),
            global.format,
        )
        .render()?;
    }
    let kb = project.open_kb()?;
    let pipeline = project.pipeline(&kb, false, true, global)?;

    let spinner = create_spinner(global.show_progress());
    spinner.set_message(format!(
        "Fetching {} reference documents...",
        project.config.reference_docs.urls.len()
    ));
    let result = pipeline.reference_docs().await;
    spinner.finish_and_clear();

    Output::new(result?, global.format).render()
}
