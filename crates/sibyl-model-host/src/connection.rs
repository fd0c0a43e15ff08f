//! One live model process and everything needed to talk to it.

use std::io;
use std::path::Path;
use std::time::Duration;

use sibyl_core::{CodecError, ConfigRequest, Context, FrameBuffer, ModelRequest, ModelResponse};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HostError;
use crate::launcher::{ProcessControl, Worker, WorkerInput, WorkerOutput};
use crate::slot::WeakSlot;

/// A failed call, and whether the connection must be thrown away.
pub(crate) struct Failure {
    pub(crate) error: HostError,
    pub(crate) discard: bool,
}

/// The byte-level side of a connection.
struct Transport {
    stdin: Option<WorkerInput>,
    stdout: WorkerOutput,
    buf: FrameBuffer,
}

impl Transport {
    async fn exchange<R: ModelRequest>(&mut self, req: &R) -> Result<R::Response, CodecError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "model input closed"))?;
        self.buf.write_request(stdin, R::FUNCTION, req).await?;
        self.buf.read_frame(&mut self.stdout).await
    }
}

pub(crate) struct Connection {
    id: u64,
    transport: Transport,
    control: Box<dyn ProcessControl>,
    last_call: Instant,
    grace_period: Duration,
    /// Cancelled when the connection closes, stopping its idle watcher.
    closed: CancellationToken,
}

impl Connection {
    /// Configure a freshly launched worker. On failure the process is shut down.
    pub(crate) async fn open(
        id: u64,
        worker: Worker,
        ctx: &Context,
        data_dir: &Path,
        grace_period: Duration,
    ) -> Result<Self, HostError> {
        let mut conn = Connection {
            id,
            transport: Transport {
                stdin: Some(worker.stdin),
                stdout: worker.stdout,
                buf: FrameBuffer::new(),
            },
            control: worker.control,
            last_call: Instant::now(),
            grace_period,
            closed: CancellationToken::new(),
        };

        let req = ConfigRequest {
            model_dir: data_dir.to_string_lossy().into_owned(),
        };
        let error = tokio::select! {
            result = conn.transport.exchange(&req) => match result {
                Ok(resp) => match resp.error() {
                    None => {
                        conn.last_call = Instant::now();
                        return Ok(conn);
                    }
                    Some(e) => HostError::ConfigRejected(e.to_string()),
                },
                Err(e) => HostError::Handshake(e),
            },
            done = ctx.done() => done.into(),
        };

        warn!("model process {} failed to start: {}", id, error);
        conn.close().await;
        Err(error)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_call.elapsed()
    }

    /// Run one request/response exchange, racing it against `ctx`.
    ///
    /// On cancellation the process is interrupted and given the grace period
    /// to settle the exchange. The caller always gets the cancellation error;
    /// the connection survives only if the exchange completed cleanly.
    pub(crate) async fn call<R: ModelRequest>(
        &mut self,
        ctx: &Context,
        req: &R,
    ) -> Result<R::Response, Failure> {
        self.last_call = Instant::now();
        let Connection {
            id,
            transport,
            control,
            grace_period,
            ..
        } = self;

        let exchange = transport.exchange(req);
        tokio::pin!(exchange);

        tokio::select! {
            result = &mut exchange => match result {
                Ok(resp) => match resp.error() {
                    None => Ok(resp),
                    Some(e) => Err(Failure {
                        error: HostError::Model(e.to_string()),
                        discard: false,
                    }),
                },
                Err(e) => Err(Failure {
                    error: HostError::Protocol(e),
                    discard: true,
                }),
            },
            done = ctx.done() => {
                info!("model call on process {} interrupted: {}", id, done);
                if let Err(e) = control.interrupt() {
                    debug!("interrupt failed: {}", e);
                }
                let discard = match tokio::time::timeout(*grace_period, &mut exchange).await {
                    Ok(Ok(_)) => false,
                    Ok(Err(e)) => {
                        debug!("interrupted exchange failed: {}", e);
                        true
                    }
                    Err(_) => {
                        warn!("model process {} unresponsive after interrupt, killing", id);
                        if let Err(e) = control.kill() {
                            warn!("kill failed: {}", e);
                        }
                        true
                    }
                };
                Err(Failure {
                    error: done.into(),
                    discard,
                })
            }
        }
    }

    /// Stop the process: interrupt, close its input, wait out the grace
    /// period, then kill.
    pub(crate) async fn close(mut self) {
        self.closed.cancel();
        if let Err(e) = self.control.interrupt() {
            debug!("interrupt failed: {}", e);
        }
        self.transport.stdin = None;

        match tokio::time::timeout(self.grace_period, self.control.wait()).await {
            Ok(Ok(())) => debug!("model process {} stopped", self.id),
            Ok(Err(e)) => warn!("waiting for model process {}: {}", self.id, e),
            Err(_) => {
                warn!(
                    "model process {} did not exit within {:?}, killing",
                    self.id, self.grace_period
                );
                if let Err(e) = self.control.kill() {
                    warn!("kill failed: {}", e);
                }
                if let Err(e) = self.control.wait().await {
                    warn!("waiting for killed model process {}: {}", self.id, e);
                }
            }
        }
    }

    /// Watch for idleness and shut the connection down once it has been
    /// unused for `idle_timeout`.
    ///
    /// The watcher only touches the connection while holding the slot, and
    /// only if the slot still holds this very connection.
    pub(crate) fn watch_idle(&self, slot: WeakSlot, idle_timeout: Duration) {
        let id = self.id;
        let closed = self.closed.clone();
        tokio::spawn(async move {
            let mut wait = idle_timeout;
            loop {
                tokio::select! {
                    _ = closed.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
                let Some(mut guard) = slot.acquire().await else {
                    return;
                };
                let idle = match guard.as_ref() {
                    Some(conn) if conn.id() == id => conn.idle_for(),
                    _ => return,
                };
                if idle < idle_timeout {
                    wait = idle_timeout - idle;
                    continue;
                }
                let Some(conn) = guard.take() else {
                    return;
                };
                drop(guard);
                info!("model process {} idle for {:?}, stopping", id, idle);
                conn.close().await;
                return;
            }
        });
    }
}
