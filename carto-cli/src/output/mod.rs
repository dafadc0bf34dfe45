//! Output formatting for the carto CLI
//!
//! Every command result is rendered either as a human-readable summary
//! (colored when stdout is a terminal) or as JSON for scripting.

use clap::ValueEnum;
use serde::Serialize;
use std::io::IsTerminal;
use std::str::FromStr;

mod json;

pub use self::json::JsonOutput;

/// Output format for CLI results
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    #[default]
    Table,
    /// JSON format for machine consumption
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: '{}'", s)),
        }
    }
}

/// Configuration for output rendering
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub no_color: bool,
    /// Compact mode (single-line JSON)
    pub compact: bool,
}

impl OutputConfig {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            no_color: false,
            compact: false,
        }
    }

    /// Create an OutputConfig with automatic TTY detection.
    ///
    /// Colors are disabled when stdout is not a terminal.
    pub fn auto_detect(format: OutputFormat) -> Self {
        Self {
            format,
            no_color: !std::io::stdout().is_terminal(),
            compact: false,
        }
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }
}

/// Types that can be displayed as a human-readable summary.
pub trait TableDisplay: Serialize {
    fn to_table(&self) -> String;
}

/// Result wrapper with format selection.
pub struct Output<T> {
    data: T,
    config: OutputConfig,
}

impl<T: TableDisplay> Output<T> {
    pub fn new(data: T, format: OutputFormat) -> Self {
        Self {
            data,
            config: OutputConfig::auto_detect(format),
        }
    }

    pub fn with_config(data: T, config: OutputConfig) -> Self {
        Self { data, config }
    }

    /// Render the output to stdout
    pub fn render(&self) -> anyhow::Result<()> {
        println!("{}", self.render_to_string());
        Ok(())
    }

    pub fn render_to_string(&self) -> String {
        match self.config.format {
            OutputFormat::Table => {
                if self.config.no_color {
                    colored::control::set_override(false);
                }
                self.data.to_table()
            }
            OutputFormat::Json => JsonOutput::format(&self.data, &self.config),
        }
    }
}

/// Simple informational message
#[derive(Debug, Serialize)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TableDisplay for Notice {
    fn to_table(&self) -> String {
        use colored::Colorize;
        format!("{} {}", "INFO:".yellow().bold(), self.message)
    }
}

/// Format a millisecond duration the way summaries print it.
pub fn format_duration(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m {:.1}s", ms / 60_000, (ms % 60_000) as f64 / 1000.0)
    } else if ms >= 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{} ms", ms)
    }
}
