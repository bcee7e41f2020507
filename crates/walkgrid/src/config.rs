//! Configuration management for the walkgrid server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use crate::cli::CliArgs;
use grid_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

fn default_bind_address() -> String {
    "127.0.0.1:4321".to_string()
}

fn default_reactor_threads() -> usize {
    2
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_max_frame_len() -> usize {
    10 * 1024 * 1024
}

fn default_max_events() -> usize {
    64
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_backlog() -> i32 {
    1024
}

fn default_stats_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding, thread counts and per-connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:4321")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Threads running the epoll loop
    #[serde(default = "default_reactor_threads")]
    pub reactor_threads: usize,
    /// Threads answering path queries
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Largest accepted request payload in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Events fetched per epoll wait
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Upper bound on one epoll wait in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Seconds between statistics log lines (0 to disable)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            reactor_threads: default_reactor_threads(),
            worker_threads: default_worker_threads(),
            max_frame_len: default_max_frame_len(),
            max_events: default_max_events(),
            poll_timeout_ms: default_poll_timeout_ms(),
            backlog: default_backlog(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file settings.
    ///
    /// `--bind` replaces the whole address; `--port` then replaces only the
    /// port of whatever address is in effect.
    pub fn apply_cli(&mut self, args: &CliArgs) -> Result<(), String> {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }

        if let Some(port) = args.port {
            let mut address: SocketAddr = self
                .server
                .bind_address
                .parse()
                .map_err(|_| format!("Invalid bind address: {}", self.server.bind_address))?;
            address.set_port(port);
            self.server.bind_address = address.to_string();
        }

        if let Some(workers) = args.workers {
            self.server.worker_threads = workers;
        }

        if let Some(reactors) = args.reactors {
            self.server.reactor_threads = reactors;
        }

        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }

        if args.json_logs {
            self.logging.json_format = true;
        }

        Ok(())
    }

    /// Converts the application configuration to a grid server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            reactor_threads: self.server.reactor_threads,
            worker_threads: self.server.worker_threads,
            max_frame_len: self.server.max_frame_len,
            max_events: self.server.max_events,
            poll_timeout_ms: self.server.poll_timeout_ms,
            backlog: self.server.backlog,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.reactor_threads == 0 {
            return Err("reactor_threads must be at least 1".to_string());
        }
        if self.server.worker_threads == 0 {
            return Err("worker_threads must be at least 1".to_string());
        }
        if self.server.max_frame_len == 0 || self.server.max_frame_len > u32::MAX as usize {
            return Err(format!(
                "max_frame_len must be between 1 and {}",
                u32::MAX
            ));
        }
        if self.server.max_events == 0 {
            return Err("max_events must be at least 1".to_string());
        }
        if self.server.backlog <= 0 {
            return Err("backlog must be positive".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:4321");
        assert_eq!(config.server.reactor_threads, 2);
        assert_eq!(config.server.worker_threads, num_cpus::get());
        assert_eq!(config.server.max_frame_len, 10 * 1024 * 1024);
        assert_eq!(config.server.poll_timeout_ms, 100);
        assert_eq!(config.server.stats_interval_secs, 60);

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.logging.file_path.is_none());

        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("walkgrid.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:4321");

        // The defaults were written out and load back identically.
        assert!(path.exists());
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.bind_address, config.server.bind_address);
        assert_eq!(reloaded.server.worker_threads, config.server.worker_threads);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "0.0.0.0:3000"
reactor_threads = 4
worker_threads = 16
max_frame_len = 65536
poll_timeout_ms = 250
stats_interval_secs = 0

[logging]
level = "debug"
json_format = true
file_path = "/tmp/walkgrid.log"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.server.reactor_threads, 4);
        assert_eq!(config.server.worker_threads, 16);
        assert_eq!(config.server.max_frame_len, 65536);
        assert_eq!(config.server.poll_timeout_ms, 250);
        assert_eq!(config.server.stats_interval_secs, 0);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.server.max_events, 64);
        assert_eq!(config.server.backlog, 1024);

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.logging.file_path.as_deref(), Some("/tmp/walkgrid.log"));
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[logging]\nlevel = \"warn\"\n")
            .await
            .unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.server.bind_address, "127.0.0.1:4321");
    }

    #[tokio::test]
    async fn test_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[server\nbind_address = ")
            .await
            .unwrap();

        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());
        config.server.bind_address = "127.0.0.1:4321".to_string();

        config.server.worker_threads = 0;
        assert!(config.validate().is_err());
        config.server.worker_threads = 1;

        config.server.reactor_threads = 0;
        assert!(config.validate().is_err());
        config.server.reactor_threads = 1;

        config.server.max_frame_len = 0;
        assert!(config.validate().is_err());
        config.server.max_frame_len = 1024;

        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "trace".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: PathBuf::from("walkgrid.toml"),
            bind_address: Some("0.0.0.0:1000".to_string()),
            port: Some(2000),
            workers: Some(3),
            reactors: Some(5),
            log_level: Some("debug".to_string()),
            json_logs: true,
        };

        config.apply_cli(&args).unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:2000");
        assert_eq!(config.server.worker_threads, 3);
        assert_eq!(config.server.reactor_threads, 5);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_json_logs_flag_is_carried_by_logging_settings() {
        let mut config = AppConfig::default();
        let args = CliArgs::try_parse_from(["walkgrid", "--json-logs"]).unwrap();

        config.apply_cli(&args).unwrap();

        // Logging setup reads only the settings, so the flag must land there.
        assert!(config.logging.json_format);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_port_override_needs_valid_address() {
        let mut config = AppConfig::default();
        config.server.bind_address = "nonsense".to_string();
        let args = CliArgs {
            port: Some(2000),
            ..CliArgs::default()
        };
        assert!(config.apply_cli(&args).is_err());
    }

    #[test]
    fn test_to_server_config() {
        let mut config = AppConfig::default();
        config.server.worker_threads = 7;
        config.server.max_frame_len = 4096;

        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.bind_address, "127.0.0.1:4321".parse().unwrap());
        assert_eq!(server_config.worker_threads, 7);
        assert_eq!(server_config.max_frame_len, 4096);
        assert_eq!(server_config.reactor_threads, 2);
    }
}
