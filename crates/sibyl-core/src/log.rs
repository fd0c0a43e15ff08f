//! Per-request log record.

use serde::{Deserialize, Serialize};

/// Everything worth remembering about one question.
///
/// Filled in as the request progresses and written out once it completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    /// Request timestamp in microseconds since the epoch, also its identifier.
    pub time_usec: i64,
    /// Short description of the request, e.g. `POST /ask`.
    pub request: String,
    /// The question as received.
    pub question: String,
    /// Search terms extracted from the question.
    pub search_terms: Vec<String>,
    /// Titles of all candidate pages found.
    pub search_results: Vec<String>,
    /// Titles of the pages included in the final prompt.
    pub used_results: Vec<String>,
    /// Every prompt sent for generation, with its response.
    pub generations: Vec<GenerationEntry>,
    /// Terminal error, if the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationEntry {
    pub prompt: String,
    pub response: String,
}

impl LogEntry {
    pub fn new(time_usec: i64, request: impl Into<String>) -> Self {
        Self {
            time_usec,
            request: request.into(),
            ..Default::default()
        }
    }

    /// Append a prompt/response pair.
    pub fn record_generation(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        self.generations.push(GenerationEntry {
            prompt: prompt.into(),
            response: response.into(),
        });
    }
}
