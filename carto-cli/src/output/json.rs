//! JSON output for machine consumption.

use super::OutputConfig;
use serde::Serialize;

pub struct JsonOutput;

impl JsonOutput {
    /// Pretty-printed unless `config.compact` is set.
    pub fn format<T: Serialize + ?Sized>(data: &T, config: &OutputConfig) -> String {
        if config.compact {
            serde_json::to_string(data).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        } else {
            serde_json::to_string_pretty(data)
                .unwrap_or_else(|e| format!("{{\n  \"error\": \"{}\"\n}}", e))
        }
    }

    /// Error envelope printed when a command fails in JSON mode.
    pub fn format_error(error: &anyhow::Error, config: &OutputConfig) -> String {
        #[derive(Serialize)]
        struct Envelope {
            success: bool,
            error: String,
        }

        Self::format(
            &Envelope {
                success: false,
                error: format!("{:#}", error),
            },
            config,
        )
    }
}
