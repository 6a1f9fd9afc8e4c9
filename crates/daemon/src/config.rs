//! Configuration management for the RootView daemon.
//!
//! Configuration is read from TOML (default `~/.config/rootview/config.toml`)
//! or, when the file extension is `.yaml`/`.yml`, from YAML. A YAML file with
//! only a top-level `allowed_roots` list is accepted as well.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::delivery::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TEXT_BYTES, MAX_CHUNK_SIZE};
use crate::files::resolver::DEFAULT_MAX_PATH_LEN;
use crate::files::DeliveryOptions;
use crate::mesh::{MeshLimits, DEFAULT_MAX_FACES, DEFAULT_MAX_VERTICES};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("allowed root must be an absolute path, got {0}")]
    RelativeRoot(PathBuf),

    #[error("allowed root does not exist or is not a directory: {0}")]
    MissingRoot(PathBuf),

    #[error("{name} must be greater than 0")]
    ZeroLimit { name: &'static str },

    #[error("chunk_size must be between 1 and {max}, got {got}")]
    InvalidChunkSize { got: usize, max: usize },

    #[error("bind must be an IP address, got {0}")]
    InvalidBind(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Separator for root lists in `ROOTVIEW_ROOTS`.
#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';

/// Main configuration structure for the RootView daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Directories the daemon may serve from.
    pub roots: RootsConfig,

    /// Preview and delivery limits.
    pub preview: PreviewConfig,

    /// Top-level `allowed_roots`, folded into `roots` after parsing.
    #[serde(skip_serializing)]
    allowed_roots: Vec<PathBuf>,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: String,

    /// Port to listen on (0 picks an ephemeral port).
    pub port: u16,
}

/// Allowed roots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RootsConfig {
    /// Absolute directories. Empty means nothing is served.
    pub allowed_roots: Vec<PathBuf>,
}

/// Preview and delivery limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    /// Maximum request path length in bytes.
    pub max_path_len: usize,

    /// Text preview cap in bytes (default: 512KB).
    pub max_text_bytes: u64,

    /// Maximum vertices accepted by the mesh decoder.
    pub max_mesh_vertices: u64,

    /// Maximum faces accepted by the mesh decoder.
    pub max_mesh_faces: u64,

    /// Chunk size for streamed bodies (default: 64KB).
    pub chunk_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_path_len: DEFAULT_MAX_PATH_LEN,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            max_mesh_vertices: DEFAULT_MAX_VERTICES,
            max_mesh_faces: DEFAULT_MAX_FACES,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PreviewConfig {
    /// Delivery options derived from these limits.
    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            chunk_size: self.chunk_size,
            max_text_bytes: self.max_text_bytes,
            mesh_limits: MeshLimits {
                max_vertices: self.max_mesh_vertices,
                max_faces: self.max_mesh_faces,
            },
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rootview")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - ROOTVIEW_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - ROOTVIEW_BIND: Override listen address
    /// - ROOTVIEW_PORT: Override listen port
    /// - ROOTVIEW_ROOTS: Replace allowed roots (path-list separated)
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = non_empty_var("ROOTVIEW_LOG_LEVEL") {
            tracing::info!(log_level = %level, "Overriding log_level from environment");
            self.daemon.log_level = level;
        }

        if let Some(bind) = non_empty_var("ROOTVIEW_BIND") {
            tracing::info!(bind = %bind, "Overriding bind from environment");
            self.server.bind = bind;
        }

        if let Some(port) = non_empty_var("ROOTVIEW_PORT") {
            match port.parse() {
                Ok(port) => {
                    tracing::info!(port, "Overriding port from environment");
                    self.server.port = port;
                }
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid ROOTVIEW_PORT"),
            }
        }

        if let Some(roots) = non_empty_var("ROOTVIEW_ROOTS") {
            self.roots.allowed_roots = roots
                .split(PATH_LIST_SEPARATOR)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            tracing::info!(
                count = self.roots.allowed_roots.len(),
                "Overriding allowed_roots from environment"
            );
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for root in &self.roots.allowed_roots {
            if !root.is_absolute() {
                return Err(ConfigError::RelativeRoot(root.clone()));
            }
            if !root.is_dir() {
                return Err(ConfigError::MissingRoot(root.clone()));
            }
        }

        let preview = &self.preview;
        for (name, value) in [
            ("max_path_len", preview.max_path_len as u64),
            ("max_text_bytes", preview.max_text_bytes),
            ("max_mesh_vertices", preview.max_mesh_vertices),
            ("max_mesh_faces", preview.max_mesh_faces),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { name });
            }
        }

        if preview.chunk_size == 0 || preview.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                got: preview.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }

        if self.server.bind.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidBind(self.server.bind.clone()));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// `.yaml` and `.yml` files are parsed as YAML, everything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let parsed = if is_yaml {
            Self::from_yaml(&contents)
        } else {
            Self::from_toml(&contents)
        };
        parsed.with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/rootview/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))?;
        Ok(config.fold_top_level_roots())
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        if yaml_str.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml_str)
            .map_err(|e| anyhow::anyhow!("Invalid YAML configuration: {}", e))?;
        Ok(config.fold_top_level_roots())
    }

    /// Save configuration to a file as TOML.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    fn fold_top_level_roots(mut self) -> Self {
        let legacy = std::mem::take(&mut self.allowed_roots);
        for root in legacy {
            if !self.roots.allowed_roots.contains(&root) {
                self.roots.allowed_roots.push(root);
            }
        }
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
