//! Bootstrap configuration for NeoParental services
//!
//! Configuration is read once at startup and never reloaded.
//!
//! # Config File Resolution
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`NEOPARENTAL_CONFIG`)
//! 3. User config (`~/.config/neoparental/config.toml`)
//! 4. System config (`/etc/neoparental/config.toml`, Linux only)
//!
//! An explicitly requested file (1 or 2) must exist. When no file is
//! discovered through 3 or 4 the service starts on built-in defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NEOPARENTAL_CONFIG";

/// Upload size cap applied before any decoding (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Model artifact and feature layout
    pub model: ModelConfig,

    /// Audio intake limits
    pub audio: AudioConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// HTTP server port
    ///
    /// Default: 8000
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Model artifact settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the exported model artifact (JSON)
    pub path: PathBuf,

    /// Feature vector layout the model was trained on
    ///
    /// One of `standard`, `with_mfcc_std`, `compact`.
    pub feature_layout: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Model/saved_model/best_model.json"),
            feature_layout: "standard".to_string(),
        }
    }
}

/// Audio intake settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Truncate decoded audio to this many seconds (None = whole clip)
    pub max_duration_secs: Option<f64>,

    /// Reject uploads larger than this many bytes
    pub max_upload_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    ///
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file and load it, falling back to defaults
    ///
    /// # Errors
    /// * Explicitly requested file (CLI or env) is missing or unreadable
    /// * File content fails to parse or validate
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_config_path(cli_path) {
            return Self::from_file(&path);
        }

        match discover_config_file() {
            Some(path) => Self::from_file(&path),
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server.host must not be empty".to_string()));
        }

        if let Some(secs) = self.audio.max_duration_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(Error::Config(format!(
                    "audio.max_duration_secs must be a positive number, got {}",
                    secs
                )));
            }
        }

        if self.audio.max_upload_bytes == 0 {
            return Err(Error::Config(
                "audio.max_upload_bytes must be greater than zero".to_string(),
            ));
        }

        if self.model.path.as_os_str().is_empty() {
            return Err(Error::Config("model.path must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Config path requested on the command line or through the environment
pub fn explicit_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// Search the platform config locations for an existing file
fn discover_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("neoparental").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/neoparental/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
