//! # Sibyl core types
//!
//! Data shared by every part of Sibyl: the messages exchanged with the
//! model-hosting process, the length-prefixed codec that frames them, the
//! per-request [`LogEntry`], and the cancellable [`Context`] every long
//! running call carries.
//!
//! ## Wire format
//!
//! ```text
//! request:  [u32 LE function][u32 LE size][size bytes of JSON payload]
//! response:                  [u32 LE size][size bytes of JSON payload]
//! ```
//!
//! The response side carries no function code, the caller already knows
//! what it asked for. The request log file reuses the response framing
//! (see [`delim`]).

pub mod codec;
mod context;
pub mod delim;
mod log;
mod protocol;

pub use codec::{CodecError, FrameBuffer, RawRequest, MAX_FRAME_SIZE};
pub use context::{Context, Done};
pub use delim::{DelimReader, DelimWriter};
pub use log::{GenerationEntry, LogEntry};
pub use protocol::{
    ConfigRequest, ConfigResponse, GenerateRequest, GenerateResponse, ModelFunction, ModelRequest,
    ModelResponse, TokenCountRequest, TokenCountResponse,
};
