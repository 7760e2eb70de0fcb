//! Configuration for the disputeql server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, data directory, model, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use disputeql_frame::DataSources;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file used when `DISPUTEQL_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Where the CSV sources live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub directory: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
        }
    }
}

impl DataConfig {
    pub fn sources(&self) -> DataSources {
        DataSources::in_dir(&self.directory)
    }
}

/// Translation backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,

    /// OpenAI-compatible endpoint; the public API when unset
    pub base_url: Option<String>,

    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    ///
    /// A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_yaml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `DISPUTEQL_CONFIG`, or `config.yaml` in the working directory
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("DISPUTEQL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DISPUTEQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DISPUTEQL_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(dir) = std::env::var("DISPUTEQL_DATA_DIR") {
            self.data.directory = PathBuf::from(dir);
        }

        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.is_empty() {
                self.llm.base_url = Some(base_url);
            }
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Ok(secs) = std::env::var("DISPUTEQL_LLM_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.llm.timeout_secs = secs;
            }
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}
