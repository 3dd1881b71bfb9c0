//! Configuration management for ipcmsg.
//!
//! Configuration is loaded from `~/.config/ipcmsg/config.toml` when the file
//! exists; every field has a default so no file is required.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Socket naming and location.
    #[serde(default)]
    pub socket: SocketConfig,
    /// Operation timeouts.
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Socket naming and location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Socket-name prefix; server sockets are named `{prefix}-{id}.sock`.
    /// Independent service families use distinct prefixes.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Override the runtime socket directory. When unset, `$XDG_RUNTIME_DIR`
    /// is used, falling back to the platform temp directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            dir: None,
        }
    }
}

fn default_prefix() -> String {
    "ipcmsg".to_string()
}

/// Timeouts for socket operations, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Opening a connection (default: 5000).
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    /// One probe exchange during discovery (default: 2000).
    #[serde(default = "default_probe_ms")]
    pub probe_ms: u64,
    /// Waiting for the response to the main message (default: 30000).
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            probe_ms: default_probe_ms(),
            request_ms: default_request_ms(),
        }
    }
}

fn default_connect_ms() -> u64 {
    5000
}

fn default_probe_ms() -> u64 {
    2000
}

fn default_request_ms() -> u64 {
    30000
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("ipcmsg"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// The directory where server sockets live: the configured override,
    /// else `$XDG_RUNTIME_DIR`, else the platform temp directory.
    pub fn socket_dir(&self) -> PathBuf {
        if let Some(dir) = &self.socket.dir {
            return dir.clone();
        }
        if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
            return PathBuf::from(runtime_dir);
        }
        std::env::temp_dir()
    }
}
