//! Embed command - fill embeddings of prepared batch files
//!
//! Reads the batch files written by `carto prepare`, embeds name and code of
//! every node under the configured rate limit, and writes the embedded
//! batches for `carto load`.

use anyhow::{bail, Result};
use carto_daemon::ingest::batch_files::{EMBEDDED_DIR, PREPARED_DIR};
use carto_daemon::ingest::EmbedPhaseReport;
use carto_embeddings::EmbeddingStats;
use colored::Colorize;
use serde::Serialize;

use super::{create_spinner, GlobalOptions, Project};
use crate::output::{Output, TableDisplay};

#[derive(Debug, Serialize)]
pub struct EmbedOutput {
    pub model: String,
    pub input_dir: String,
    pub output_dir: String,
    #[serde(flatten)]
    pub report: EmbedPhaseReport,
    pub stats: EmbeddingStats,
}

impl TableDisplay for EmbedOutput {
    fn to_table(&self) -> String {
        let report = &self.report;
        let mut lines = vec![format!("{}", "Embedding complete".green().bold())];
        lines.push(format!("  {}: {}", "Model".cyan(), self.model));
        lines.push(format!(
            "  {}: {} files in {} rate windows",
            "Input".cyan(),
            report.input_files,
            report.groups
        ));
        lines.push(format!(
            "  {}: {} embedded, {} already embedded",
            "Nodes".cyan(),
            report.nodes_embedded,
            report.nodes_already_embedded
        ));
        lines.push(format!(
            "  {}: {} empty, {} retries, {} failed",
            "Calls".cyan(),
            self.stats.skipped_empty,
            self.stats.retries,
            self.stats.failed
        ));
        lines.push(format!(
            "  {}: {} files in {}",
            "Output".cyan(),
            report.output_files.len(),
            self.output_dir
        ));
        if self.stats.failed > 0 {
            lines.push(format!(
                "{} {} texts got a zero vector after exhausting retries",
                "WARNING:".yellow().bold(),
                self.stats.failed
            ));
        }
        lines.join("\n")
    }
}

/// Run the embed command.
pub async fn run(
    path: &str,
    input: Option<&str>,
    output: Option<&str>,
    global: &GlobalOptions,
) -> Result<()> {
    let project = Project::load(path, global)?;
    if !project.config.embeddings.enabled {
        bail!("Embeddings are disabled in the configuration ([embeddings] enabled = false)");
    }

    let input_dir = project.phase_dir(input, PREPARED_DIR);
    let output_dir = project.phase_dir(output, EMBEDDED_DIR);
    let kb = project.open_kb()?;
    let pipeline = project.pipeline(&kb, true, false, global)?;

    let spinner = create_spinner(global.show_progress());
    spinner.set_message(format!("Embedding batches from {}...", input_dir.display()));
    let result = pipeline.embed_dir(&input_dir, &output_dir).await;
    spinner.finish_and_clear();
    let report = result?;

    let stats = pipeline.embedding_stats().unwrap_or_default();
    let output = EmbedOutput {
        model: project.config.embeddings.model.clone(),
        input_dir: input_dir.display().to_string(),
        output_dir: output_dir.display().to_string(),
        report,
        stats,
    };
    Output::new(output, global.format).render()
}
