//! Background writer for the request log.
//!
//! Entries are queued on a bounded channel and appended by a single task, so
//! requests never wait on disk I/O unless the queue is full. Once the file
//! reaches its chunk size it is renamed to `<path>.<unix seconds>` and a new
//! file is started.

use std::path::{Path, PathBuf};

use sibyl_core::{CodecError, DelimWriter, LogEntry};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("log record: {0}")]
    Codec(#[from] CodecError),

    #[error("log writer already stopped")]
    Stopped,
}

enum Command {
    Write(LogEntry),
    Close(oneshot::Sender<Result<(), LogError>>),
}

pub struct LogWriter {
    commands: mpsc::Sender<Command>,
}

impl LogWriter {
    /// Open (or continue) the log at `path` and start the writer task.
    pub async fn open(path: impl Into<PathBuf>, chunk_size: u64, queue: usize) -> Result<Self, LogError> {
        let path = path.into();
        let (file, size) = open_chunk(&path).await?;
        info!("request log {} opened at {} bytes", path.display(), size);

        let (commands, rx) = mpsc::channel(queue.max(1));
        let chunk = Chunk {
            path,
            chunk_size,
            size,
            writer: DelimWriter::new(file),
        };
        tokio::spawn(chunk.run(rx));
        Ok(Self { commands })
    }

    /// Queue an entry. Waits only if the queue is full.
    pub async fn write(&self, entry: LogEntry) {
        if self.commands.send(Command::Write(entry)).await.is_err() {
            warn!("request log writer stopped, dropping entry");
        }
    }

    /// Flush everything queued so far and stop the writer.
    ///
    /// Reports the first write error the task ran into, if any.
    pub async fn close(&self) -> Result<(), LogError> {
        let (done, result) = oneshot::channel();
        self.commands
            .send(Command::Close(done))
            .await
            .map_err(|_| LogError::Stopped)?;
        result.await.map_err(|_| LogError::Stopped)?
    }
}

struct Chunk {
    path: PathBuf,
    chunk_size: u64,
    size: u64,
    writer: DelimWriter<File>,
}

impl Chunk {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut failure = None;
        while let Some(command) = commands.recv().await {
            match command {
                Command::Write(entry) => {
                    if failure.is_some() {
                        continue;
                    }
                    if let Err(e) = self.append(&entry).await {
                        error!("request log {}: {}", self.path.display(), e);
                        failure = Some(e);
                    }
                }
                Command::Close(done) => {
                    let result = match failure.take() {
                        Some(e) => Err(e),
                        None => self.flush().await,
                    };
                    let _ = done.send(result);
                    return;
                }
            }
        }
        if let Err(e) = self.flush().await {
            error!("request log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        self.size += self.writer.write(entry).await? as u64;
        if self.size >= self.chunk_size {
            self.rotate().await?;
        }
        Ok(())
    }

    async fn rotate(&mut self) -> Result<(), LogError> {
        self.flush().await?;
        let rotated = rotated_path(&self.path, chrono::Utc::now().timestamp()).await?;
        tokio::fs::rename(&self.path, &rotated).await?;
        info!("request log rotated to {}", rotated.display());

        let (file, size) = open_chunk(&self.path).await?;
        self.writer = DelimWriter::new(file);
        self.size = size;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), LogError> {
        self.writer.get_mut().sync_data().await?;
        Ok(())
    }
}

async fn open_chunk(path: &Path) -> Result<(File, u64), LogError> {
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    let size = file.metadata().await?.len();
    Ok((file, size))
}

/// `<path>.<secs>`, or `<path>.<secs>.<n>` if that name is taken.
async fn rotated_path(path: &Path, secs: i64) -> Result<PathBuf, LogError> {
    let base = format!("{}.{}", path.display(), secs);
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while tokio::fs::try_exists(&candidate).await? {
        candidate = PathBuf::from(format!("{base}.{n}"));
        n += 1;
    }
    debug!("next log chunk name: {}", candidate.display());
    Ok(candidate)
}
