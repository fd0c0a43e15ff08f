//! Errors from the prompt flow, labelled with the step that failed.

use sibyl_model_host::HostError;
use sibyl_wiki::WikiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("extracting search terms: {0}")]
    SearchTerms(#[source] HostError),

    #[error("counting tokens: {0}")]
    CountTokens(#[source] HostError),

    #[error("searching wiki for {term:?}: {source}")]
    Search { term: String, source: WikiError },

    #[error("fetching wiki page {title:?} ({id}): {source}")]
    Fetch {
        title: String,
        id: i64,
        source: WikiError,
    },

    #[error("augmenting prompt with wiki page {title:?} ({id}): {source}")]
    Augment {
        title: String,
        id: i64,
        source: HostError,
    },

    #[error("generating response: {0}")]
    Respond(#[source] HostError),
}

impl FlowError {
    /// Whether the flow stopped because the caller's context ended.
    pub fn is_cancellation(&self) -> bool {
        match self {
            FlowError::SearchTerms(e)
            | FlowError::CountTokens(e)
            | FlowError::Augment { source: e, .. }
            | FlowError::Respond(e) => e.is_cancellation(),
            FlowError::Search { source, .. } | FlowError::Fetch { source, .. } => {
                source.is_cancellation()
            }
        }
    }
}
