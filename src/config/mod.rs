//! Configuration management for scratchdata
//!
//! Configuration is read from a single TOML file. Every field has a default,
//! so a missing file or a partial file is valid. Command-line flags are
//! applied on top by the binary.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [export]
//! pipe_capacity = 4096
//! default_format = "ndjson"
//!
//! [supervisor]
//! drain_timeout_secs = 10
//!
//! [[destinations]]
//! name = "local"
//! kind = "memory"
//! seed = "/var/lib/scratchdata/local.ndjson"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::{ExportFormat, ExportOptions};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Supervisor configuration
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Configured destinations
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json: bool,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Export pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Capacity of the NDJSON bridge pipe in bytes
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,

    /// Sink write buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Format used when a query does not name one
    #[serde(default = "default_export_format")]
    pub default_format: ExportFormat,
}

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds subsystems get to finish after cancellation before being
    /// aborted; unset waits indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_secs: Option<u64>,

    /// Seconds between destination health checks
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
}

/// A configured destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Unique destination name
    pub name: String,

    /// Destination implementation
    #[serde(default = "default_destination_kind")]
    pub kind: DestinationKind,

    /// NDJSON file loaded into the destination at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

/// Destination implementations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// In-process table
    Memory,
}

// Default value functions
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

fn default_pipe_capacity() -> usize {
    4096
}

fn default_buffer_size() -> usize {
    8192
}

fn default_export_format() -> ExportFormat {
    ExportFormat::Json
}

fn default_health_interval() -> u64 {
    30
}

fn default_destination_kind() -> DestinationKind {
    DestinationKind::Memory
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: default_pipe_capacity(),
            buffer_size: default_buffer_size(),
            default_format: default_export_format(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: None,
            health_interval_secs: default_health_interval(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded and validated configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// An explicit path must exist. The default location is optional; when
    /// it is absent the defaults are used.
    ///
    /// # Arguments
    /// * `path` - Explicit configuration file, if any
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scratchdata")
            .join("config.toml")
    }

    /// Serialize the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.export.pipe_capacity == 0 {
            return Err(invalid("export.pipe_capacity", "0"));
        }
        if self.export.buffer_size == 0 {
            return Err(invalid("export.buffer_size", "0"));
        }
        if self.supervisor.health_interval_secs == 0 {
            return Err(invalid("supervisor.health_interval_secs", "0"));
        }

        let mut names = HashSet::new();
        for destination in &self.destinations {
            if destination.name.trim().is_empty() {
                return Err(ConfigError::MissingField("destinations.name".to_string()).into());
            }
            if !names.insert(destination.name.as_str()) {
                return Err(invalid("destinations.name", &destination.name));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ScratchError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl ExportConfig {
    /// Options for the export pipeline
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            buffer_size: self.buffer_size,
            pipe_capacity: self.pipe_capacity,
        }
    }
}

impl SupervisorConfig {
    /// Drain timeout as Duration
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }

    /// Health check interval as Duration
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}
