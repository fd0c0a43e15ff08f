//! Error types for model host operations.

use sibyl_core::{CodecError, Done};
use thiserror::Error;

/// Errors that can occur while talking to the model process.
#[derive(Debug, Error)]
pub enum HostError {
    /// Binary or data directory failed validation.
    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    /// The model process could not be started.
    #[error("failed to start model process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The configuration exchange with a fresh process failed.
    #[error("model handshake failed: {0}")]
    Handshake(#[source] CodecError),

    /// The process refused the configuration message.
    #[error("model rejected configuration: {0}")]
    ConfigRejected(String),

    /// Framing or I/O failure. The connection is discarded.
    #[error("model protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// The model reported an error in a well-formed response.
    #[error("model error: {0}")]
    Model(String),

    /// The caller's context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl HostError {
    /// Whether the error came from the caller's context rather than the model.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HostError::Cancelled | HostError::DeadlineExceeded)
    }
}

impl From<Done> for HostError {
    fn from(done: Done) -> Self {
        match done {
            Done::Cancelled => HostError::Cancelled,
            Done::DeadlineExceeded => HostError::DeadlineExceeded,
        }
    }
}
