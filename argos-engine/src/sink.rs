//! Result persistence

use argos_core::{ArgosConfig, Error, OutputFormat, Result};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes serialized results into an output directory
#[derive(Debug, Clone)]
pub struct ResultSink {
    directory: PathBuf,
    format: OutputFormat,
}

impl ResultSink {
    pub fn new(directory: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
        }
    }

    pub fn from_config(config: &ArgosConfig) -> Self {
        Self::new(config.output_directory.clone(), config.output_format)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// `capture_YYYYmmdd_HHMMSS.<ext>` in local time
    pub fn default_filename(&self) -> String {
        format!(
            "capture_{}.{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            self.format.extension()
        )
    }

    /// Serialize `value` in the sink's format.
    ///
    /// TOML documents must be tables, so only map-shaped values (such as a
    /// capture result) can be rendered as TOML.
    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Toml => toml::to_string_pretty(value)
                .map_err(|e| Error::Serialization(format!("TOML: {}", e))),
        }
    }

    /// Write `value` to `filename` (or a timestamped default) and return the
    /// full path. The output directory is created if needed.
    pub async fn save<T: Serialize + ?Sized>(&self, value: &T, filename: Option<&str>) -> Result<PathBuf> {
        let contents = self.render(value)?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let name = match filename {
            Some(name) => name.to_string(),
            None => self.default_filename(),
        };
        let path = self.directory.join(name);
        tokio::fs::write(&path, contents).await?;

        info!(path = %path.display(), "Results saved");
        Ok(path)
    }
}
