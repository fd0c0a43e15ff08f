//! Server configuration file.
//!
//! ```toml
//! listen = "127.0.0.1:8080"
//! log_file = "/var/log/sibyl/requests.log"
//!
//! [model]
//! binary_path = "/opt/sibyl/model-host"
//! data_dir = "/opt/sibyl/model"
//!
//! [wiki]
//! url = "https://esolangs.org/w/api.php"
//!
//! [limits]
//! max_concurrent_requests = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sibyl_flow::FlowConfig;
use sibyl_model_host::{HostSettings, ModelConfig};
use sibyl_wiki::WikiConfig;
use thiserror::Error;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub model: ModelConfig,
    pub wiki: WikiConfig,
    /// Request log; no log is kept when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub flow: FlowConfig,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

/// Admission, timeout and housekeeping limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Requests served at once; the rest are turned away.
    pub max_concurrent_requests: usize,
    /// Longest accepted question, in bytes.
    pub max_request_bytes: usize,
    pub request_timeout_secs: u64,
    /// Size at which the request log is rotated.
    pub log_chunk_bytes: u64,
    pub idle_timeout_secs: u64,
    pub grace_period_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        let host = HostSettings::default();
        Self {
            max_concurrent_requests: 10,
            // comfortably fits an IRC message
            max_request_bytes: 1024,
            request_timeout_secs: 300,
            log_chunk_bytes: 2 * 1024 * 1024,
            idle_timeout_secs: host.idle_timeout.as_secs(),
            grace_period_secs: host.grace_period.as_secs(),
        }
    }
}

impl Limits {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn host_settings(&self) -> HostSettings {
        HostSettings::default()
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .with_grace_period(Duration::from_secs(self.grace_period_secs))
    }
}

impl ServerConfig {
    /// Read the config file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// `SIBYL_LISTEN` and `SIBYL_LOG_FILE` take precedence over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = var("SIBYL_LISTEN") {
            self.listen = listen;
        }
        if let Some(log_file) = var("SIBYL_LOG_FILE") {
            self.log_file = (!log_file.is_empty()).then(|| PathBuf::from(log_file));
        }
    }
}
