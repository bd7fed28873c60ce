//! Tracing subscriber setup

use argos_core::{ArgosConfig, Error, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the given verbosity, falling back to `level`
pub fn directive(verbose: u8, level: &str) -> String {
    match verbose {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn env_filter(verbose: u8, level: &str) -> Result<EnvFilter> {
    if verbose == 0 {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(directive(verbose, level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber: stderr, plus `log_file` when configured
pub fn init(config: &ArgosConfig, verbose: u8) -> Result<()> {
    let filter = env_filter(verbose, &config.log_level)?;

    let file_layer = match config.log_file.as_deref() {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install logger: {}", e)))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
