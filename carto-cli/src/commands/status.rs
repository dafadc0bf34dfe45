//! Status command - show graph database contents and next steps

use crate::output::{format_duration, Output, TableDisplay};
use anyhow::Result;
use carto_daemon::config::CONFIG_FILE;
use carto_daemon::storage::KnowledgeStats;
use colored::Colorize;
use serde::Serialize;
use std::time::Instant;

use super::{GlobalOptions, Project};

/// Status information for a project.
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub root: String,
    /// Whether `.cartorc.toml` exists
    pub config_exists: bool,
    pub database_exists: bool,
    pub database_path: String,
    pub embeddings_enabled: bool,
    pub stats: Option<KnowledgeStats>,
    pub next_action: Option<String>,
    pub message: String,
    pub duration_ms: u64,
}

impl TableDisplay for StatusInfo {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();

        match &self.stats {
            Some(stats) => {
                lines.push(format!("{}", "Carto Status: Ready".green().bold()));
                lines.push(format!("  {}: {}", "Database".cyan(), self.database_path));
                lines.push(format!("  {}: {}", "Nodes".cyan(), stats.node_count));
                lines.push(format!("  {}: {}", "Relations".cyan(), stats.relation_count));

                if !stats.corpus_counts.is_empty() {
                    lines.push(format!("  {}:", "By Corpus".cyan()));
                    for (corpus, count) in &stats.corpus_counts {
                        lines.push(format!("    {}: {}", corpus, count));
                    }
                }
                if !stats.descriptor_counts.is_empty() {
                    lines.push(format!("  {}:", "By Descriptor".cyan()));
                    for (descriptor, count) in &stats.descriptor_counts {
                        lines.push(format!("    {}: {}", descriptor, count));
                    }
                }
                if !stats.relation_counts.is_empty() {
                    lines.push(format!("  {}:", "By Relation".cyan()));
                    for (kind, count) in &stats.relation_counts {
                        lines.push(format!("    {}: {}", kind, count));
                    }
                }
                lines.push(format!(
                    "  {}: {}",
                    "Last ingest".cyan(),
                    stats.last_ingest.as_deref().unwrap_or("never")
                ));
            }
            None => {
                lines.push(format!("{}", "Carto Status: Not initialized".yellow().bold()));
                lines.push(format!("  {}", self.message));
            }
        }

        lines.push(format!(
            "  {}: {}",
            "Config".cyan(),
            if self.config_exists { "Yes" } else { "No" }
        ));
        lines.push(format!(
            "  {}: {}",
            "Embeddings".cyan(),
            if self.embeddings_enabled { "enabled" } else { "disabled" }
        ));

        if let Some(action) = &self.next_action {
            lines.push(String::new());
            lines.push(format!("{}: {}", "Next action".yellow(), action));
        }

        lines.push(format!("\n{}", format!("({})", format_duration(self.duration_ms)).dimmed()));
        lines.join("\n")
    }
}

/// Run the status command.
///
/// Never creates the database: a missing file is reported as
/// "not initialized".
pub async fn run(path: &str, global: &GlobalOptions) -> Result<()> {
    let start = Instant::now();
    let project = Project::load(path, global)?;
    let db_path = project.db_path();

    let database_exists = db_path.exists();
    let mut stats = None;
    let message;
    let mut next_action = None;

    if database_exists {
        match project.open_kb().and_then(|kb| kb.stats()) {
            Ok(s) => {
                if s.node_count == 0 {
                    next_action = Some("carto ingest".to_string());
                }
                stats = Some(s);
                message = "Graph database ready.".to_string();
            }
            Err(e) => {
                message = format!("Database exists but could not be read: {:#}", e);
                next_action = Some("carto ingest".to_string());
            }
        }
    } else {
        message = format!(
            "No graph database at {}. Run 'carto ingest' to build one.",
            db_path.display()
        );
        next_action = Some("carto ingest".to_string());
    }

    let status = StatusInfo {
        root: project.root.display().to_string(),
        config_exists: project.root.join(CONFIG_FILE).exists(),
        database_exists,
        database_path: db_path.display().to_string(),
        embeddings_enabled: project.config.embeddings.enabled,
        stats,
        next_action,
        message,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    Output::new(status, global.format).render()
}
