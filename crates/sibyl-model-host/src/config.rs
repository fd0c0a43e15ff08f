//! Model host configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Default time a model process may sit unused before it is stopped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default wait after an interrupt before the process is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Where to find the model host binary and its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Executable implementing the model protocol on stdin/stdout.
    pub binary_path: PathBuf,
    /// Directory holding the model files, sent to the process on startup.
    pub data_dir: PathBuf,
}

impl ModelConfig {
    pub fn new(binary_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Check that the binary exists and the data directory is a directory.
    pub fn validate(&self) -> Result<(), HostError> {
        std::fs::metadata(&self.binary_path).map_err(|e| {
            HostError::InvalidConfig(format!("binary {}: {}", self.binary_path.display(), e))
        })?;
        let meta = std::fs::metadata(&self.data_dir).map_err(|e| {
            HostError::InvalidConfig(format!("model dir {}: {}", self.data_dir.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(HostError::InvalidConfig(format!(
                "not a directory: {}",
                self.data_dir.display()
            )));
        }
        Ok(())
    }
}

/// Timing knobs for the process supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSettings {
    pub idle_timeout: Duration,
    pub grace_period: Duration,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl HostSettings {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}
