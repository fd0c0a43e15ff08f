//! MediaWiki knowledge source for Sibyl.
//!
//! [`WikiClient`] searches a wiki by title or full text and fetches rendered
//! pages, which [`extract_text`] turns into plain-text [`Section`]s suitable
//! for a prompt.

mod client;
mod error;
mod text;

pub use client::{PageId, SearchKind, WikiClient, WikiConfig, DEFAULT_NAMESPACES};
pub use error::WikiError;
pub use text::{extract_text, Page, Section};
