// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker configuration.
//!
//! A TOML file with every field defaulted, so an empty or missing file
//! yields a runnable dev configuration. `ORRERY_CONFIG` selects the
//! file path (default `orrery.toml` in the working directory).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ORRERY_CONFIG";

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "orrery.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid port pool range {start}..{end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("session.idle_timeout_seconds must be positive, got {0}")]
    InvalidIdleTimeout(f64),
}

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub port_pool: PortPoolConfig,
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// API-key gate. An empty key leaves the gate open (dev mode).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key: String,
}

impl AuthConfig {
    /// The configured key, or `None` when the gate is open.
    pub fn api_key_opt(&self) -> Option<String> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(self.api_key.clone())
        }
    }
}

/// Half-open range of worker ports.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortPoolConfig {
    pub start: u16,
    pub end: u16,
}

impl Default for PortPoolConfig {
    fn default() -> Self {
        Self {
            start: 5600,
            end: 5700,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_seconds: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 3600.0,
        }
    }
}

/// Durable store settings, including the command log filter lists
/// (comma-separated command names; include wins over exclude).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub log_include_commands: String,
    pub log_exclude_commands: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("orrery.db"),
            log_include_commands: String::new(),
            log_exclude_commands: String::new(),
        }
    }
}

/// Worker subprocess settings. An empty `binary` means the
/// `orrery-worker` executable next to the broker binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub binary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of `full`, `compact`, `pretty`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl Config {
    /// Load from the path named by `ORRERY_CONFIG`, falling back to
    /// `orrery.toml`. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            return Self::default().validate();
        }
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.port_pool.end <= self.port_pool.start {
            return Err(ConfigError::InvalidPortRange {
                start: self.port_pool.start,
                end: self.port_pool.end,
            });
        }
        if self.session.idle_timeout_seconds <= 0.0 {
            return Err(ConfigError::InvalidIdleTimeout(
                self.session.idle_timeout_seconds,
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
