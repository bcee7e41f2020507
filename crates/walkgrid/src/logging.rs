//! Logging system setup and configuration
//!
//! Installs the global tracing subscriber. `RUST_LOG` wins over the
//! configured level when it is set.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Builds the level filter, preferring the environment over `level`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Opens the configured log destination: the file in append mode, or stdout.
fn build_writer(config: &LoggingSettings) -> Result<BoxMakeWriter> {
    match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path}"))?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stdout)),
    }
}

/// Initialize the logging system
///
/// # Arguments
/// * `config` - Logging section of the application configuration, with
///   command-line overrides already applied
///
/// # Returns
/// * `Result<()>` - Fails when the log file cannot be opened or a global
///   subscriber is already installed
pub fn setup_logging(config: &LoggingSettings) -> Result<()> {
    let filter = build_filter(&config.level);
    let writer = build_writer(config)?;
    let ansi = config.file_path.is_none();

    let (json_layer, text_layer) = if config.json_format {
        let layer = fmt::layer()
            .json()
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_writer(writer);
        (Some(layer), None)
    } else {
        let layer = fmt::layer()
            .with_ansi(ansi)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_writer(writer);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_file_is_reported() {
        let config = LoggingSettings {
            file_path: Some("/nonexistent-directory/walkgrid.log".to_string()),
            ..LoggingSettings::default()
        };

        let err = setup_logging(&config).unwrap_err();
        assert!(err.to_string().contains("failed to open log file"));
    }

    #[test]
    fn test_log_file_is_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("walkgrid.log");
        let config = LoggingSettings {
            file_path: Some(path.to_string_lossy().into_owned()),
            ..LoggingSettings::default()
        };

        build_writer(&config).unwrap();
        assert!(path.exists());
    }
}
