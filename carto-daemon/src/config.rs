//! Configuration loading from `.cartorc.toml`.
//!
//! Configuration is optional: every section falls back to defaults when the
//! file or the section is missing.
//!
//! # Example Configuration
//!
//! ```toml
//! [scanner]
//! ignore = ["vendor/", "*.generated.ts"]
//! max_file_size_kb = 1024
//!
//! [resolver]
//! tracked = ["FunctionDeclaration", "ClassDeclaration", "MethodDeclaration"]
//!
//! [embeddings]
//! model = "text-embedding-3-small"
//! dimension = 768
//! api_key_env = "OPENAI_API_KEY"
//! calls_per_interval = 2200
//! interval_secs = 60
//!
//! [database]
//! path = ".carto/graph.duckdb"
//!
//! [ingest]
//! batch_size = 500
//! work_dir = ".carto/work"
//!
//! [reference_docs]
//! urls = ["https://github.com/acme/app/raw/develop/.prettierrc"]
//! path_marker = "raw/develop"
//! ```

use carto_core::{ScanOptions, TrackingProfile, DEFAULT_IGNORE_PATTERNS};
use carto_embeddings::{
    BatcherConfig, OpenAiConfig, TokenBucket, DEFAULT_CALLS_PER_INTERVAL, DEFAULT_DIMENSION,
    DEFAULT_MODEL,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ingest::DEFAULT_LOAD_BATCH_SIZE;

/// Configuration file name, looked up in the project root.
pub const CONFIG_FILE: &str = ".cartorc.toml";

/// Default database location relative to the project root.
pub const DEFAULT_DB_PATH: &str = ".carto/graph.duckdb";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Root configuration structure loaded from `.cartorc.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CartoConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub reference_docs: ReferenceDocsConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// File discovery.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScannerConfig {
    /// Glob patterns ignored on top of `.gitignore` / `.cartoignore` and the
    /// built-in defaults.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Files larger than this are skipped.
    #[serde(default)]
    pub max_file_size_kb: Option<u64>,

    #[serde(default)]
    pub follow_symlinks: bool,
}

/// Overrides for the tracked-kind table.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResolverConfig {
    /// Kind names that become graph nodes. `None` keeps the defaults.
    #[serde(default)]
    pub tracked: Option<Vec<String>>,

    /// Kind names that qualify as call/usage targets. `None` means the
    /// tracked set.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// Skip the embed phase entirely when `false`.
    pub enabled: bool,
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub calls_per_interval: u32,
    pub interval_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Nodes embedded concurrently.
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            calls_per_interval: DEFAULT_CALLS_PER_INTERVAL,
            interval_secs: 60,
            max_retries: 3,
            initial_backoff_ms: 200,
            concurrency: 32,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Database file, relative to the project root. Default: `.carto/graph.duckdb`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Nodes per load transaction and per prepared batch file.
    pub batch_size: usize,
    /// Source files built per prepare step.
    pub files_per_step: usize,
    /// Where `prepared/` and `embedded/` batch files go. Unset means the
    /// one-shot ingest keeps everything in memory.
    pub work_dir: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_LOAD_BATCH_SIZE,
            files_per_step: 50,
            work_dir: None,
        }
    }
}

/// Style and tooling configuration of the Rocket.Chat monorepo, the
/// reference documents loaded when none are configured.
pub const DEFAULT_REFERENCE_DOC_URLS: &[&str] = &[
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/.prettierrc",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/postcss.config.js",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.stylelintrc",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.stylelintignore",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.postcssrc",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.eslintrc.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/tsconfig.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/scalingo.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/tsconfig.typecheck.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/tsconfig.webpack.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.babelrc",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.codeclimate.yml",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/apps/meteor/.storybook/babel.config.js",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/.editorconfig",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/.kodiak.toml",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/tsconfig.base.client.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/tsconfig.base.json",
    "https://github.com/RocketChat/Rocket.Chat/raw/develop/tsconfig.base.server.json",
];

/// Marker splitting the default URLs into repository and document path.
pub const DEFAULT_REFERENCE_DOC_MARKER: &str = "raw/develop";

/// Reference documents. An empty `urls` list still wipes the corpus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceDocsConfig {
    pub urls: Vec<String>,

    /// Document paths are taken from the part of the URL after this marker.
    pub path_marker: Option<String>,
}

impl Default for ReferenceDocsConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_REFERENCE_DOC_URLS.iter().map(|u| u.to_string()).collect(),
            path_marker: Some(DEFAULT_REFERENCE_DOC_MARKER.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 9130 }
    }
}

impl CartoConfig {
    /// Load configuration from `.cartorc.toml` in `root`.
    ///
    /// A missing file gives defaults. Read or parse errors are logged as
    /// warnings and defaults are used.
    pub fn load(root: &Path) -> Self {
        match Self::load_strict(root) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    /// Like [`CartoConfig::load`], but any problem with an existing file,
    /// including failed validation, is an error.
    pub fn load_strict(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Invalid("ingest.batch_size must be at least 1".into()));
        }
        if self.ingest.files_per_step == 0 {
            return Err(ConfigError::Invalid(
                "ingest.files_per_step must be at least 1".into(),
            ));
        }
        if self.embeddings.dimension == 0 {
            return Err(ConfigError::Invalid("embeddings.dimension must be at least 1".into()));
        }
        if self.embeddings.calls_per_interval == 0 || self.embeddings.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "embeddings.calls_per_interval and interval_secs must be positive".into(),
            ));
        }
        self.tracking_profile()?;
        Ok(())
    }

    /// Ignore patterns for the scanner, user patterns first.
    pub fn ignore_patterns(&self) -> Vec<String> {
        let mut patterns = self.scanner.ignore.clone();
        for default in DEFAULT_IGNORE_PATTERNS {
            if !patterns.iter().any(|p| p == default) {
                patterns.push(default.to_string());
            }
        }
        patterns
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            ignore_patterns: self.ignore_patterns(),
            max_file_size_bytes: self.scanner.max_file_size_kb.map(|kb| kb * 1024),
            follow_symlinks: self.scanner.follow_symlinks,
        }
    }

    pub fn tracking_profile(&self) -> Result<TrackingProfile, ConfigError> {
        let defaults = TrackingProfile::default();
        if self.resolver.tracked.is_none() && self.resolver.scopes.is_none() {
            return Ok(defaults);
        }

        let tracked: Vec<String> = match &self.resolver.tracked {
            Some(names) => names.clone(),
            None => defaults.tracked.iter().map(|k| k.as_str().to_string()).collect(),
        };
        TrackingProfile::from_names(&tracked, self.resolver.scopes.as_deref())
            .map_err(ConfigError::Invalid)
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(self.database.path.as_deref().unwrap_or(DEFAULT_DB_PATH))
    }

    pub fn work_dir(&self, root: &Path) -> Option<PathBuf> {
        self.ingest.work_dir.as_deref().map(|dir| root.join(dir))
    }

    /// Client settings, with the API key read from the configured variable.
    pub fn openai_config(&self) -> Result<OpenAiConfig, ConfigError> {
        let env = &self.embeddings.api_key_env;
        let api_key = std::env::var(env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(env.clone()))?;

        Ok(OpenAiConfig {
            api_key,
            model: self.embeddings.model.clone(),
            base_url: self.embeddings.base_url.clone(),
            dimension: self.embeddings.dimension,
            timeout: Duration::from_secs(self.embeddings.timeout_secs),
        })
    }

    pub fn token_bucket(&self) -> TokenBucket {
        TokenBucket::new(
            self.embeddings.calls_per_interval,
            Duration::from_secs(self.embeddings.interval_secs),
        )
    }

    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            max_retries: self.embeddings.max_retries,
            initial_backoff: Duration::from_millis(self.embeddings.initial_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_core::SyntaxKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CartoConfig::default();
        assert!(config.embeddings.enabled);
        assert_eq!(config.embeddings.calls_per_interval, 2200);
        assert_eq!(config.embeddings.dimension, 768);
        assert_eq!(config.ingest.batch_size, DEFAULT_LOAD_BATCH_SIZE);
        assert!(config.ingest.work_dir.is_none());
        assert_eq!(config.reference_docs.urls.len(), 18);
        assert_eq!(config.reference_docs.path_marker.as_deref(), Some("raw/develop"));
        config.validate().unwrap();
    }

    #[test]
    fn test_reference_docs_can_be_emptied() {
        let config: CartoConfig = toml::from_str("[reference_docs]\nurls = []\n").unwrap();
        assert!(config.reference_docs.urls.is_empty());
        // The marker keeps its default when only the list is overridden
        assert_eq!(config.reference_docs.path_marker.as_deref(), Some("raw/develop"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[scanner]
ignore = ["vendor/"]
max_file_size_kb = 512

[resolver]
tracked = ["FunctionDeclaration", "ClassDeclaration"]

[embeddings]
model = "text-embedding-3-large"
dimension = 256
calls_per_interval = 100

[database]
path = "db/graph.duckdb"

[ingest]
batch_size = 25
work_dir = "work"

[reference_docs]
urls = ["https://example.com/raw/main/.editorconfig"]
path_marker = "raw/main"

[server]
port = 8080
"#;
        let config: CartoConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.embeddings.model, "text-embedding-3-large");
        assert_eq!(config.embeddings.dimension, 256);
        // Unspecified fields of a present section keep their defaults
        assert_eq!(config.embeddings.interval_secs, 60);
        assert_eq!(config.scan_options().max_file_size_bytes, Some(512 * 1024));
        assert_eq!(config.ingest.batch_size, 25);
        assert_eq!(config.ingest.files_per_step, 50);
        assert_eq!(config.server.port, 8080);

        let root = Path::new("/project");
        assert_eq!(config.db_path(root), PathBuf::from("/project/db/graph.duckdb"));
        assert_eq!(config.work_dir(root), Some(PathBuf::from("/project/work")));

        let profile = config.tracking_profile().unwrap();
        assert!(profile.is_tracked(SyntaxKind::ClassDeclaration));
        assert!(profile.is_tracked(SyntaxKind::SourceFile));
        assert!(!profile.is_tracked(SyntaxKind::VariableDeclaration));
    }

    #[test]
    fn test_ignore_patterns_with_custom() {
        let config: CartoConfig = toml::from_str("[scanner]\nignore = [\"custom/\", \".git/\"]").unwrap();
        let patterns = config.ignore_patterns();
        assert_eq!(patterns[0], "custom/");
        assert_eq!(patterns.iter().filter(|p| *p == ".git/").count(), 1);
        assert!(patterns.contains(&"node_modules/".to_string()));
        for default in DEFAULT_IGNORE_PATTERNS {
            assert!(patterns.iter().any(|p| p == default), "missing {}", default);
        }
    }

    #[test]
    fn test_lenient_and_strict_loading() {
        let dir = TempDir::new().unwrap();
        assert!(CartoConfig::load_strict(dir.path()).is_ok());

        std::fs::write(dir.path().join(CONFIG_FILE), "[ingest\nbatch_size = ").unwrap();
        assert!(matches!(
            CartoConfig::load_strict(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
        // Lenient load falls back to defaults
        assert_eq!(CartoConfig::load(dir.path()).ingest.batch_size, DEFAULT_LOAD_BATCH_SIZE);

        std::fs::write(dir.path().join(CONFIG_FILE), "[ingest]\nbatch_size = 0").unwrap();
        assert!(matches!(
            CartoConfig::load_strict(dir.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_kind_is_invalid() {
        let config: CartoConfig = toml::from_str("[resolver]\ntracked = [\"Lambda\"]").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_api_key() {
        let config: CartoConfig =
            toml::from_str("[embeddings]\napi_key_env = \"CARTO_TEST_KEY_THAT_IS_NOT_SET\"").unwrap();
        assert!(matches!(
            config.openai_config(),
            Err(ConfigError::MissingApiKey(name)) if name == "CARTO_TEST_KEY_THAT_IS_NOT_SET"
        ));
    }
}
