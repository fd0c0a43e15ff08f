//! Supervisor for the model-hosting child process.
//!
//! [`ModelHost`] starts the model binary lazily on the first call, keeps it
//! running between calls, and stops it again after a period of idleness.
//! Calls are serialized: the process only ever sees one request at a time.

mod config;
mod connection;
mod error;
mod host;
mod launcher;
mod slot;
#[cfg(test)]
mod testing;

pub use config::{HostSettings, ModelConfig, DEFAULT_GRACE_PERIOD, DEFAULT_IDLE_TIMEOUT};
pub use error::HostError;
pub use host::ModelHost;
pub use launcher::{CommandLauncher, Launcher, ProcessControl, Worker, WorkerInput, WorkerOutput};
