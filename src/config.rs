//! Configuration module for the connection harness.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the harness driver
#[derive(Parser, Debug)]
#[command(name = "ringlink")]
#[command(version = "0.1.0")]
#[command(about = "A minimal client/server connection harness over io_uring", long_about = None)]
pub struct CliArgs {
    /// Run as the connecting or the accepting side
    #[arg(value_enum)]
    pub mode: RunMode,

    /// Port to listen on (server) or connect to (client)
    pub port: Option<u16>,

    /// Host address (e.g. 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Which side of the connection to drive. A missing or unrecognized mode
/// makes clap exit non-zero before the harness starts.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Client,
    Server,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Address the harness binds to or connects to
#[derive(Debug, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Engine-related configuration
#[derive(Debug, Deserialize)]
pub struct EngineSection {
    /// Submission/completion ring size
    #[serde(default = "default_ring_entries")]
    pub ring_entries: u32,
    /// Listen backlog for the server socket
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: i32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            ring_entries: default_ring_entries(),
            listen_backlog: default_listen_backlog(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2998
}

fn default_ring_entries() -> u32 {
    64
}

fn default_listen_backlog() -> i32 {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: RunMode,
    pub host: String,
    pub port: u16,
    pub ring_entries: u32,
    pub listen_backlog: i32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            mode: cli.mode,
            host: cli.host.unwrap_or(toml_config.link.host),
            port: cli.port.unwrap_or(toml_config.link.port),
            ring_entries: toml_config.engine.ring_entries,
            listen_backlog: toml_config.engine.listen_backlog,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.link.host, "127.0.0.1");
        assert_eq!(config.link.port, 2998);
        assert_eq!(config.engine.ring_entries, 64);
        assert_eq!(config.engine.listen_backlog, 128);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [link]
            host = "0.0.0.0"
            port = 4100

            [engine]
            ring_entries = 256
            listen_backlog = 32

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.link.host, "0.0.0.0");
        assert_eq!(config.link.port, 4100);
        assert_eq!(config.engine.ring_entries, 256);
        assert_eq!(config.engine.listen_backlog, 32);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: TomlConfig = toml::from_str("[link]\nport = 3000\n").unwrap();
        assert_eq!(config.link.host, "127.0.0.1");
        assert_eq!(config.link.port, 3000);
        assert_eq!(config.engine.ring_entries, 64);
    }
}
