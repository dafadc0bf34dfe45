//! Prepare command - build the graph into batch files without loading it

use anyhow::Result;
use carto_daemon::ingest::batch_files::PREPARED_DIR;
use carto_daemon::PrepareReport;
use colored::Colorize;
use serde::Serialize;

use super::{create_spinner, GlobalOptions, Project};
use crate::commands::ingest::diagnostic_lines;
use crate::output::{Output, TableDisplay};

#[derive(Debug, Serialize)]
pub struct PrepareOutput {
    pub output_dir: String,
    #[serde(flatten)]
    pub report: PrepareReport,
}

impl TableDisplay for PrepareOutput {
    fn to_table(&self) -> String {
        let report = &self.report;
        let mut lines = vec![format!("{}", "Prepare complete".green().bold())];
        lines.push(format!(
            "  {}: {}/{}",
            "Steps run".cyan(),
            report.steps_run,
            report.steps_total
        ));
        lines.push(format!(
            "  {}: {} ({} failed)",
            "Files".cyan(),
            report.file_count,
            report.failed_files
        ));
        lines.push(format!("  {}: {}", "Nodes".cyan(), report.node_count));
        lines.push(format!("  {}: {}", "Relations".cyan(), report.relation_count));
        lines.push(format!(
            "  {}: {} in {}",
            "Batch files".cyan(),
            report.batch_files.len(),
            self.output_dir
        ));
        lines.extend(diagnostic_lines(&report.diagnostics));
        lines.join("\n")
    }
}

/// Run the prepare command.
pub async fn run(
    path: &str,
    output: Option<&str>,
    start_from: usize,
    global: &GlobalOptions,
) -> Result<()> {
    let project = Project::load(path, global)?;
    let out_dir = project.phase_dir(output, PREPARED_DIR);
    let kb = project.open_kb()?;
    let pipeline = project.pipeline(&kb, false, false, global)?;

    let spinner = create_spinner(global.show_progress());
    spinner.set_message(format!("Preparing {}...", project.root.display()));
    let result = pipeline.prepare(&project.root, &out_dir, start_from).await;
    spinner.finish_and_clear();

    let output = PrepareOutput {
        output_dir: out_dir.display().to_string(),
        report: result?,
    };
    Output::new(output, global.format).render()
}
