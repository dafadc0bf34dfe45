//! Command implementations for the carto CLI

pub mod docs;
pub mod embed;
pub mod ingest;
pub mod load;
pub mod prepare;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use carto_daemon::{CartoConfig, GraphStore, IngestPipeline, KnowledgeBase, PipelineOptions};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::OutputFormat;

/// Work directory used by the phase commands when `ingest.work_dir` is unset.
pub const DEFAULT_WORK_DIR: &str = ".carto/work";

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub format: OutputFormat,
    pub quiet: bool,
    /// Fail on configuration errors instead of using defaults
    pub strict: bool,
    /// Database path overriding the configured one
    pub db: Option<PathBuf>,
}

impl GlobalOptions {
    /// Progress bars only make sense for human output.
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Table
    }
}

/// A project root with its configuration.
pub struct Project {
    pub root: PathBuf,
    pub config: CartoConfig,
    db: Option<PathBuf>,
}

impl Project {
    pub fn load(path: &str, global: &GlobalOptions) -> Result<Self> {
        let root = Path::new(path)
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from(path));
        if !root.is_dir() {
            bail!("Project root {} is not a directory", root.display());
        }

        let config = if global.strict {
            CartoConfig::load_strict(&root).context("Invalid configuration")?
        } else {
            CartoConfig::load(&root)
        };

        Ok(Self {
            root,
            config,
            db: global.db.clone(),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        match &self.db {
            Some(path) => path.clone(),
            None => self.config.db_path(&self.root),
        }
    }

    pub fn open_kb(&self) -> Result<Arc<KnowledgeBase>> {
        let path = self.db_path();
        let kb = KnowledgeBase::open(&path)
            .with_context(|| format!("Failed to open graph database at {}", path.display()))?;
        Ok(Arc::new(kb))
    }

    /// Directory holding the intermediate batch files of one phase.
    pub fn phase_dir(&self, explicit: Option<&str>, phase: &str) -> PathBuf {
        match explicit {
            Some(dir) => self.root.join(dir),
            None => self
                .config
                .work_dir(&self.root)
                .unwrap_or_else(|| self.root.join(DEFAULT_WORK_DIR))
                .join(phase),
        }
    }

    /// Build a pipeline over `kb`. The embedding batcher is only created
    /// (and the API key only required) when `embed` is set.
    pub fn pipeline(
        &self,
        kb: &Arc<KnowledgeBase>,
        embed: bool,
        reference_docs: bool,
        global: &GlobalOptions,
    ) -> Result<IngestPipeline> {
        let embed = embed && self.config.embeddings.enabled;
        let batcher = if embed {
            IngestPipeline::batcher_from_config(&self.config)?
        } else {
            None
        };
        let store: Arc<dyn GraphStore> = kb.clone();
        Ok(IngestPipeline::new(
            self.config.clone(),
            store,
            batcher,
            PipelineOptions {
                embed,
                reference_docs,
                show_progress: global.show_progress(),
            },
        ))
    }
}

/// Create a spinner for progress indication. Hidden when `visible` is false.
pub fn create_spinner(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
