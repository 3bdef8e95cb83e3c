//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files, environment variable overrides, and rendering
//! the difference between a running configuration and the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where index files are read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("index-analyzer").to_string_lossy().to_string())
        .unwrap_or_else(|| "./index_data".to_string())
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Analyzer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Expected spacing between samples of a chunk
    #[serde(default = "default_downsample_period")]
    pub downsample_period_ms: i64,

    /// A series with more chunks than this is fragmented
    #[serde(default = "default_fragmentation_threshold")]
    pub fragmentation_threshold: usize,

    /// Emit one debug line per chunk
    #[serde(default = "default_trace_chunks")]
    pub trace_chunks: bool,

    /// Stop each index walk after this many series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_limit: Option<usize>,
}

fn default_downsample_period() -> i64 {
    10_000 // 10 seconds
}

fn default_fragmentation_threshold() -> usize {
    1000
}

fn default_trace_chunks() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            downsample_period_ms: default_downsample_period(),
            fragmentation_threshold: default_fragmentation_threshold(),
            trace_chunks: default_trace_chunks(),
            series_limit: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// The first candidate file that exists is used; if it fails to load,
    /// that error is returned rather than falling back to defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("index-analyzer").join("config.toml")),
            Some(PathBuf::from("/etc/index-analyzer/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        match Self::load_first_existing(&config_paths)? {
            Some(config) => Ok(config),
            None => {
                tracing::info!("Using default config with environment overrides");
                Self::from_env()
            }
        }
    }

    fn load_first_existing(paths: &[PathBuf]) -> Result<Option<Self>, ConfigError> {
        let Some(path) = paths.iter().find(|path| path.exists()) else {
            return Ok(None);
        };

        let config = Self::load_with_env(path)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(Some(config))
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(data_dir) = lookup("INDEX_ANALYZER_DATA_DIR") {
            self.index.data_dir = data_dir;
        }

        if let Some(period) = lookup("INDEX_ANALYZER_DOWNSAMPLE_PERIOD_MS") {
            self.analysis.downsample_period_ms = period.parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "INDEX_ANALYZER_DOWNSAMPLE_PERIOD_MS is not an integer: {}",
                    period
                ))
            })?;
        }

        if let Some(level) = lookup("INDEX_ANALYZER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("INDEX_ANALYZER_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Reject values the analyzer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.downsample_period_ms <= 0 {
            return Err(ConfigError::Invalid(format!(
                "analysis.downsample_period_ms must be positive, got {}",
                self.analysis.downsample_period_ms
            )));
        }
        if self.analysis.series_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "analysis.series_limit must be at least 1".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                other
            ))),
        }
    }

    /// The values of this configuration that differ from the defaults
    pub fn diff_from_defaults(&self) -> Result<Option<toml::Table>, ConfigError> {
        let current = to_table(self)?;
        let defaults = to_table(&Config::default())?;
        Ok(diff_tables(&current, &defaults))
    }

    /// `diff_from_defaults` rendered as TOML; empty when nothing differs
    pub fn render_diff(&self) -> Result<String, ConfigError> {
        match self.diff_from_defaults()? {
            Some(diff) => toml::to_string(&diff).map_err(|e| ConfigError::Invalid(e.to_string())),
            None => Ok(String::new()),
        }
    }
}

fn to_table(config: &Config) -> Result<toml::Table, ConfigError> {
    match toml::Value::try_from(config) {
        Ok(toml::Value::Table(table)) => Ok(table),
        Ok(other) => Err(ConfigError::Invalid(format!(
            "config serialized to a {}, not a table",
            other.type_str()
        ))),
        Err(e) => Err(ConfigError::Invalid(e.to_string())),
    }
}

/// Entries of `current` that are absent from or different in `defaults`
///
/// Nested tables are compared recursively and kept only when non-empty;
/// every other value, arrays included, is compared whole.
fn diff_tables(current: &toml::Table, defaults: &toml::Table) -> Option<toml::Table> {
    let mut diff = toml::Table::new();

    for (key, value) in current {
        match (value, defaults.get(key)) {
            (toml::Value::Table(cur), Some(toml::Value::Table(def))) => {
                if let Some(nested) = diff_tables(cur, def) {
                    diff.insert(key.clone(), toml::Value::Table(nested));
                }
            }
            (value, Some(default)) if value == default => {}
            (value, _) => {
                diff.insert(key.clone(), value.clone());
            }
        }
    }

    (!diff.is_empty()).then_some(diff)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Index Analyzer Configuration
#
# Environment variables override these settings:
# - INDEX_ANALYZER_DATA_DIR
# - INDEX_ANALYZER_DOWNSAMPLE_PERIOD_MS
# - INDEX_ANALYZER_LOG_LEVEL
# - INDEX_ANALYZER_LOG_FORMAT

[index]
# Root directory holding one subdirectory per table
data_dir = "~/.local/share/index-analyzer"

[analysis]
# Expected spacing between samples inside a chunk (ms)
downsample_period_ms = 10000

# Series with more chunks than this are reported as fragmented
fragmentation_threshold = 1000

# Log one line per chunk at debug level (target index_analyzer::chunks)
trace_chunks = true

# Stop each index walk after this many series
# series_limit = 100000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/index-analyzer/index-analyzer.log"
"#
    .to_string()
}
