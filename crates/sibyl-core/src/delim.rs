//! Files of length-delimited records.
//!
//! Each record uses the response framing, `[u32 LE size][JSON payload]`,
//! back to back with no file header.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::codec::{CodecError, FrameBuffer};

/// Reads records one at a time.
pub struct DelimReader<R> {
    inner: R,
    buf: FrameBuffer,
}

impl DelimReader<BufReader<File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncRead + Unpin> DelimReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: FrameBuffer::new(),
        }
    }

    /// The next record, or `None` at a clean end of file.
    ///
    /// A file that ends inside a record, or whose size header is out of
    /// range, is an error.
    pub async fn read<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        match self.buf.read_record(&mut self.inner).await {
            Ok(record) => Ok(Some(record)),
            Err(CodecError::Eof) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Appends records.
pub struct DelimWriter<W> {
    inner: W,
    buf: FrameBuffer,
}

impl<W: AsyncWrite + Unpin> DelimWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: FrameBuffer::new(),
        }
    }

    /// Write one record, returning its size on disk.
    pub async fn write<T: Serialize>(&mut self, record: &T) -> Result<usize, CodecError> {
        self.buf.write_frame(&mut self.inner, record).await
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}
