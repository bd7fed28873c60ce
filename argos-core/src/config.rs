//! Argos configuration
//!
//! Settings are loaded from a JSON or TOML file, or from `ARGOS_*`
//! environment variables. Every field has a default so partial files are
//! accepted.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Worker pool flavour used for blocking captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    /// Blocking captures run on a bounded thread pool
    #[default]
    Thread,
    /// Each capture runs in a child worker process
    Process,
}

impl FromStr for ExecutorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(ExecutorType::Thread),
            "process" => Ok(ExecutorType::Process),
            other => Err(Error::config(format!("Unknown executor type: {}", other))),
        }
    }
}

/// Serialization format for saved results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Toml,
}

impl OutputFormat {
    /// File extension used for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Toml => "toml",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "toml" => Ok(OutputFormat::Toml),
            other => Err(Error::config(format!("Unknown output format: {}", other))),
        }
    }
}

/// Engine-level fallbacks for capture requests that omit fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDefaults {
    pub filter: String,
    pub count: usize,
    pub timeout: Duration,
}

/// Cadence of the continuous capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Packet count per interface per round
    pub round_count: usize,
    /// Capture timeout per round
    pub round_timeout: Duration,
    /// Pause between rounds
    pub round_interval: Duration,
    /// Pause after a failed round
    pub error_backoff: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            round_count: 10,
            round_timeout: Duration::from_secs(5),
            round_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Configuration for the Argos capture engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgosConfig {
    // Network settings
    pub interfaces: Vec<String>,
    pub bridge_name: Option<String>,
    pub promiscuous_mode: bool,

    // Capture settings
    pub default_filter: String,
    pub default_count: usize,
    /// Seconds
    pub default_timeout: u64,
    pub capture_buffer_size: usize,

    // Concurrency settings
    pub max_concurrent_captures: usize,
    pub executor_type: ExecutorType,
    pub max_workers: Option<usize>,

    // Logging settings
    pub log_level: String,
    pub log_file: Option<PathBuf>,

    // Output settings
    pub output_format: OutputFormat,
    pub output_directory: PathBuf,

    // Protocol settings
    pub protocol: String,
    pub protocol_settings: BTreeMap<String, serde_json::Value>,

    // Continuous stream settings
    pub stream_round_count: usize,
    /// Seconds
    pub stream_round_timeout: u64,
    pub stream_round_interval_ms: u64,
    pub stream_error_backoff_ms: u64,
}

impl Default for ArgosConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            bridge_name: None,
            promiscuous_mode: true,
            default_filter: String::new(),
            default_count: 100,
            default_timeout: 30,
            capture_buffer_size: 1024 * 1024,
            max_concurrent_captures: 5,
            executor_type: ExecutorType::Thread,
            max_workers: None,
            log_level: "info".to_string(),
            log_file: None,
            output_format: OutputFormat::Json,
            output_directory: PathBuf::from("./captures"),
            protocol: "arp".to_string(),
            protocol_settings: BTreeMap::new(),
            stream_round_count: 10,
            stream_round_timeout: 5,
            stream_round_interval_ms: 1000,
            stream_error_backoff_ms: 5000,
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

fn parse_number<T: FromStr>(var: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} must be a number, got '{}'", var, value)))
}

impl ArgosConfig {
    /// Load configuration from a JSON or TOML file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| Error::config(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| Error::config(e.to_string()))?
        };

        debug!(path = %path.display(), "Loaded configuration file");
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `ARGOS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(interfaces) = lookup("ARGOS_INTERFACES") {
            config.interfaces = interfaces
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(bridge) = lookup("ARGOS_BRIDGE_NAME").filter(|b| !b.is_empty()) {
            config.bridge_name = Some(bridge);
        }

        if let Some(filter) = lookup("ARGOS_DEFAULT_FILTER") {
            config.default_filter = filter;
        }
        if let Some(count) = lookup("ARGOS_DEFAULT_COUNT") {
            config.default_count = parse_number("ARGOS_DEFAULT_COUNT", &count)?;
        }
        if let Some(timeout) = lookup("ARGOS_DEFAULT_TIMEOUT") {
            config.default_timeout = parse_number("ARGOS_DEFAULT_TIMEOUT", &timeout)?;
        }

        if let Some(max) = lookup("ARGOS_MAX_CONCURRENT") {
            config.max_concurrent_captures = parse_number("ARGOS_MAX_CONCURRENT", &max)?;
        }
        if let Some(executor) = lookup("ARGOS_EXECUTOR_TYPE") {
            config.executor_type = executor.parse()?;
        }

        if let Some(level) = lookup("ARGOS_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(file) = lookup("ARGOS_LOG_FILE") {
            config.log_file = Some(PathBuf::from(file));
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON or TOML file
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self)?
        };

        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), "Saved configuration file");
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_captures == 0 {
            return Err(Error::config("max_concurrent_captures must be at least 1"));
        }
        if self.default_count == 0 {
            return Err(Error::config("default_count must be at least 1"));
        }
        if self.max_workers == Some(0) {
            return Err(Error::config("max_workers must be at least 1"));
        }
        if self.stream_round_count == 0 {
            return Err(Error::config("stream_round_count must be at least 1"));
        }
        if matches!(self.bridge_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(Error::config("bridge_name must not be empty"));
        }
        Ok(())
    }

    /// Fallbacks applied to capture requests
    pub fn capture_defaults(&self) -> CaptureDefaults {
        CaptureDefaults {
            filter: self.default_filter.clone(),
            count: self.default_count,
            timeout: Duration::from_secs(self.default_timeout),
        }
    }

    /// Continuous stream cadence
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            round_count: self.stream_round_count,
            round_timeout: Duration::from_secs(self.stream_round_timeout),
            round_interval: Duration::from_millis(self.stream_round_interval_ms),
            error_backoff: Duration::from_millis(self.stream_error_backoff_ms),
        }
    }

    /// Worker pool size, falling back to the host's available parallelism
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}
