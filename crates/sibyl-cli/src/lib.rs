//! # Sibyl server
//!
//! The pieces behind the `sibyl` binary: the TOML [`config`], the HTTP
//! [`api`] that answers questions through the prompt flow, and the
//! [`log_writer`] that keeps a record of every request.

pub mod api;
pub mod config;
pub mod log_writer;

pub use api::{Api, ApiError, IdGenerator, REQUEST_ID_HEADER};
pub use config::{ConfigError, Limits, ServerConfig};
pub use log_writer::{LogError, LogWriter};
