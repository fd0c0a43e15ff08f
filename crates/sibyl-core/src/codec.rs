//! Length-prefixed message framing.
//!
//! Requests are `[function][size][payload]`, responses and log records are
//! `[size][payload]`. All integers are little-endian `u32`, payloads are JSON.
//! A [`FrameBuffer`] is reused across calls. On a model pipe any frame
//! larger than [`MAX_FRAME_SIZE`] is an invariant violation and panics;
//! [`FrameBuffer::read_record`] reports it as [`CodecError::Oversized`]
//! for input that is not trusted to be well formed, such as files.

use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::ModelFunction;

/// Hard ceiling for a single frame, header included.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

const SIZE_LEN: usize = 4;
const REQUEST_HEADER_LEN: usize = 8;

/// Errors produced while reading or writing frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream ended cleanly, before the first byte of a frame.
    #[error("end of stream")]
    Eof,

    /// I/O failure, including a stream that ends in the middle of a frame.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The payload could not be serialized or parsed.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// A request carried a function code this side does not know.
    #[error("unknown function code {0}")]
    UnknownFunction(u32),

    /// A size header declared a frame larger than [`MAX_FRAME_SIZE`].
    #[error("frame size {0} exceeds the maximum of {MAX_FRAME_SIZE} bytes")]
    Oversized(usize),
}

impl CodecError {
    pub fn is_eof(&self) -> bool {
        matches!(self, CodecError::Eof)
    }
}

/// A request read off the wire, payload not yet decoded.
#[derive(Debug)]
pub struct RawRequest<'a> {
    pub function: ModelFunction,
    pub payload: &'a [u8],
}

impl RawRequest<'_> {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(self.payload)?)
    }
}

/// Scratch buffer shared by every frame read or written on one stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

fn check_frame_size(n: usize) {
    if n > MAX_FRAME_SIZE {
        panic!("{}", CodecError::Oversized(n));
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocated size of the scratch buffer.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn sized(&mut self, n: usize) -> &mut [u8] {
        check_frame_size(n);
        self.data.clear();
        self.data.resize(n, 0);
        &mut self.data[..]
    }

    /// Serialize `msg` after `header` reserved bytes; returns the payload size.
    fn encode<T: Serialize>(&mut self, header: usize, msg: &T) -> Result<u32, CodecError> {
        self.data.clear();
        self.data.resize(header, 0);
        serde_json::to_writer(&mut self.data, msg)?;
        check_frame_size(self.data.len());
        Ok((self.data.len() - header) as u32)
    }

    /// Encode a request frame into the buffer.
    pub fn encode_request<T: Serialize>(
        &mut self,
        function: ModelFunction,
        msg: &T,
    ) -> Result<&[u8], CodecError> {
        let size = self.encode(REQUEST_HEADER_LEN, msg)?;
        self.data[0..4].copy_from_slice(&function.code().to_le_bytes());
        self.data[4..8].copy_from_slice(&size.to_le_bytes());
        Ok(&self.data)
    }

    /// Encode a response (or log record) frame into the buffer.
    pub fn encode_frame<T: Serialize>(&mut self, msg: &T) -> Result<&[u8], CodecError> {
        let size = self.encode(SIZE_LEN, msg)?;
        self.data[0..4].copy_from_slice(&size.to_le_bytes());
        Ok(&self.data)
    }

    pub async fn write_request<W, T>(
        &mut self,
        w: &mut W,
        function: ModelFunction,
        msg: &T,
    ) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin + ?Sized,
        T: Serialize,
    {
        let frame = self.encode_request(function, msg)?;
        w.write_all(frame).await?;
        w.flush().await?;
        Ok(())
    }

    /// Write a `[size][payload]` frame, returning the number of bytes written.
    pub async fn write_frame<W, T>(&mut self, w: &mut W, msg: &T) -> Result<usize, CodecError>
    where
        W: AsyncWrite + Unpin + ?Sized,
        T: Serialize,
    {
        let frame = self.encode_frame(msg)?;
        w.write_all(frame).await?;
        w.flush().await?;
        Ok(frame.len())
    }

    /// Read one `[size][payload]` frame. Blocks until the whole frame is in.
    pub async fn read_frame<R, T>(&mut self, r: &mut R) -> Result<T, CodecError>
    where
        R: AsyncRead + Unpin + ?Sized,
        T: DeserializeOwned,
    {
        match self.read_record(r).await {
            Err(CodecError::Oversized(n)) => panic!("{}", CodecError::Oversized(n)),
            other => other,
        }
    }

    /// Like [`read_frame`](Self::read_frame), but an oversized size header
    /// is returned as [`CodecError::Oversized`] instead of panicking.
    pub async fn read_record<R, T>(&mut self, r: &mut R) -> Result<T, CodecError>
    where
        R: AsyncRead + Unpin + ?Sized,
        T: DeserializeOwned,
    {
        let mut header = [0u8; SIZE_LEN];
        read_header(r, &mut header).await?;
        let total = SIZE_LEN + u32::from_le_bytes(header) as usize;
        if total > MAX_FRAME_SIZE {
            return Err(CodecError::Oversized(total));
        }
        let body = self.sized(total - SIZE_LEN);
        r.read_exact(body).await?;
        Ok(serde_json::from_slice(body)?)
    }

    /// Read one request frame. The payload is consumed even when the
    /// function code is unknown, so the stream stays in sync.
    pub async fn read_request<R>(&mut self, r: &mut R) -> Result<RawRequest<'_>, CodecError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut header = [0u8; REQUEST_HEADER_LEN];
        read_header(r, &mut header).await?;
        let code = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        check_frame_size(REQUEST_HEADER_LEN + size);
        r.read_exact(self.sized(size)).await?;
        let function = ModelFunction::from_code(code).ok_or(CodecError::UnknownFunction(code))?;
        Ok(RawRequest {
            function,
            payload: &self.data,
        })
    }
}

/// Fill `header`, reporting [`CodecError::Eof`] only if no byte arrived.
async fn read_header<R>(r: &mut R, header: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < header.len() {
        let n = r.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(CodecError::Eof);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame header").into());
        }
        filled += n;
    }
    Ok(())
}
