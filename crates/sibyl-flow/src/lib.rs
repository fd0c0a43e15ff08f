//! # Sibyl prompt flow
//!
//! Turns a question into an answer by asking the model for search terms,
//! pulling matching wiki pages into the prompt while they fit the token
//! budget (summarizing the ones that do not), and generating the answer
//! from the result.
//!
//! ```text
//! question ──> search terms ──> wiki search ──> fetch ──> fit / summarize / drop
//!                                    ^                           │
//!                                    └────── next page/term ─────┘
//!                                                   │
//!                                           final generation ──> answer
//! ```

mod config;
mod error;
mod flow;
pub mod prompt;
mod source;
mod terms;

pub use config::FlowConfig;
pub use error::FlowError;
pub use flow::Flow;
pub use source::{KnowledgeSource, Model};
pub use terms::extract_search_terms;
