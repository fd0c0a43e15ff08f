//! Error types for wiki operations.

use sibyl_core::Done;
use thiserror::Error;

/// Errors that can occur while querying the wiki.
#[derive(Debug, Error)]
pub enum WikiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wiki answered with a non-success status.
    #[error("wiki returned HTTP {status}")]
    Status { status: u16 },

    /// Response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rendered page HTML did not have the expected shape.
    #[error("wiki text extraction: {0}")]
    Extract(String),

    /// The caller's context ended before the wiki answered.
    #[error(transparent)]
    Done(#[from] Done),
}

impl WikiError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WikiError::Done(_))
    }
}
