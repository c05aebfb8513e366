//! Client configuration
//!
//! Stored in `~/.config/kubesnap/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags
//! 2. Environment variable `KUBESNAP_HOST`
//! 3. Config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::channel::ReconnectConfig;
use crate::error::{Result, SyncError};

/// Env var overriding the server host
pub const HOST_ENV: &str = "KUBESNAP_HOST";

pub const DEFAULT_HOST: &str = "localhost:8000";
pub const DEFAULT_PATH: &str = "/api/ws";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host, `host[:port]`
    pub host: String,
    /// `ws` or `wss`
    pub scheme: String,
    /// Channel path on the host
    pub path: String,
    /// Where the persisted filter lives; platform data dir when unset
    pub state_dir: Option<PathBuf>,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            scheme: "ws".to_string(),
            path: DEFAULT_PATH.to_string(),
            state_dir: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Returns `~/.config/kubesnap/` on Unix, `%APPDATA%/kubesnap/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kubesnap")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error if it exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SyncError::Config {
            reason: format!("Failed to read config file: {}", e),
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SyncError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })?;
        config.reconnect.validate()?;
        Ok(config)
    }

    /// Environment variables take precedence over config file values
    pub fn with_env(mut self) -> Self {
        if let Ok(host) = std::env::var(HOST_ENV) {
            if !host.is_empty() {
                self.host = host;
            }
        }
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Channel endpoint, e.g. `ws://localhost:8000/api/ws`
    pub fn endpoint(&self) -> Result<Url> {
        let invalid = |reason: String| SyncError::InvalidEndpoint {
            endpoint: format!("{}://{}{}", self.scheme, self.host, self.path),
            reason,
        };

        if self.scheme != "ws" && self.scheme != "wss" {
            return Err(invalid(format!("unsupported scheme '{}'", self.scheme)));
        }
        if self.host.is_empty() || self.host.contains('/') {
            return Err(invalid("host must be host[:port]".into()));
        }

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let url = Url::parse(&format!("{}://{}{}", self.scheme, self.host, path))
            .map_err(|e| invalid(e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid("missing host".into()));
        }
        Ok(url)
    }

    /// Directory holding client-local state
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kubesnap")
        })
    }
}
