//! In-process stand-in for the model binary, driven over duplex pipes.
//!
//! Prompts script the behaviour: `slow:<ms>` answers after a delay unless
//! interrupted, `hang` ignores interrupts, `crash` closes the pipes, `fail`
//! reports a model error, `stubborn` answers but then refuses to exit when
//! asked to, anything else is echoed back.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sibyl_core::{
    ConfigRequest, ConfigResponse, FrameBuffer, GenerateRequest, GenerateResponse, ModelFunction,
    TokenCountRequest, TokenCountResponse,
};
use tokio::io::DuplexStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ModelConfig;
use crate::error::HostError;
use crate::launcher::{Launcher, ProcessControl, Worker};

pub(crate) const FAKE_MODEL_DIR: &str = "fake-model-data";

#[derive(Default)]
struct Counters {
    starts: AtomicUsize,
    running: AtomicUsize,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
    interrupts: AtomicUsize,
    kills: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct FakeLauncher {
    counters: Arc<Counters>,
    expected_dir: String,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self {
            counters: Arc::default(),
            expected_dir: FAKE_MODEL_DIR.to_string(),
        }
    }

    /// Only accept configuration for a data directory with this name.
    pub(crate) fn expecting_dir(mut self, dir: &str) -> Self {
        self.expected_dir = dir.to_string();
        self
    }

    pub(crate) fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> usize {
        self.counters.requests.load(Ordering::SeqCst)
    }

    /// Requests that arrived while another one was still being handled.
    pub(crate) fn overlaps(&self) -> usize {
        self.counters.overlaps.load(Ordering::SeqCst)
    }

    pub(crate) fn interrupts(&self) -> usize {
        self.counters.interrupts.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.counters.kills.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, _config: &ModelConfig) -> Result<Worker, HostError> {
        let (host_in, model_in) = tokio::io::duplex(64 * 1024);
        let (model_out, host_out) = tokio::io::duplex(64 * 1024);
        let (signals, signal_rx) = watch::channel(0u64);
        let killed = CancellationToken::new();

        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.counters.running.fetch_add(1, Ordering::SeqCst);

        let model = FakeModel {
            counters: self.counters.clone(),
            expected_dir: self.expected_dir.clone(),
            signals: signal_rx,
            configured: false,
            stubborn: false,
        };
        let counters = self.counters.clone();
        let task_killed = killed.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = task_killed.cancelled() => {}
                _ = model.serve(model_in, model_out) => {}
            }
            counters.running.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(Worker {
            stdin: Box::new(host_in),
            stdout: Box::new(host_out),
            control: Box::new(FakeControl {
                signals,
                killed,
                task: Some(task),
                counters: self.counters.clone(),
            }),
        })
    }
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        counters.requests.fetch_add(1, Ordering::SeqCst);
        if counters.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            counters.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        InFlight(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeModel {
    counters: Arc<Counters>,
    expected_dir: String,
    signals: watch::Receiver<u64>,
    configured: bool,
    stubborn: bool,
}

impl FakeModel {
    async fn serve(mut self, mut input: DuplexStream, mut output: DuplexStream) {
        let mut rbuf = FrameBuffer::new();
        let mut wbuf = FrameBuffer::new();
        let counters = self.counters.clone();
        loop {
            let Ok(raw) = rbuf.read_request(&mut input).await else {
                if self.stubborn {
                    std::future::pending::<()>().await;
                }
                return;
            };
            let _in_flight = InFlight::enter(&counters);
            let written = match raw.function {
                ModelFunction::Config => {
                    let Ok(req) = raw.decode::<ConfigRequest>() else { return };
                    let resp = self.configure(&req);
                    wbuf.write_frame(&mut output, &resp).await
                }
                ModelFunction::TokenCount => {
                    let Ok(req) = raw.decode::<TokenCountRequest>() else { return };
                    let mut resp = TokenCountResponse::default();
                    if self.configured {
                        resp.token_count = req.prompt.matches(' ').count() as i32 + 1;
                    } else {
                        resp.error = "model not yet configured".to_string();
                    }
                    wbuf.write_frame(&mut output, &resp).await
                }
                ModelFunction::Generate => {
                    let Ok(req) = raw.decode::<GenerateRequest>() else { return };
                    let Some(resp) = self.generate(&req.prompt).await else {
                        return;
                    };
                    wbuf.write_frame(&mut output, &resp).await
                }
            };
            if written.is_err() {
                return;
            }
        }
    }

    fn configure(&mut self, req: &ConfigRequest) -> ConfigResponse {
        let mut resp = ConfigResponse::default();
        if req.model_dir.ends_with(&self.expected_dir) {
            self.configured = true;
        } else {
            resp.error = "bad model directory".to_string();
        }
        resp
    }

    /// `None` simulates the process dying mid-request.
    async fn generate(&mut self, prompt: &str) -> Option<GenerateResponse> {
        self.signals.borrow_and_update();
        let mut resp = GenerateResponse::default();
        if !self.configured {
            resp.error = "model not yet configured".to_string();
            return Some(resp);
        }

        if let Some(rest) = prompt.strip_prefix("slow:") {
            let ms = rest
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => resp.generated = "done".to_string(),
                _ = self.signals.changed() => resp.error = "interrupted".to_string(),
            }
            return Some(resp);
        }

        match prompt {
            "hang" => {
                std::future::pending::<()>().await;
                None
            }
            "crash" => None,
            "stubborn" => {
                self.stubborn = true;
                resp.generated = "ok".to_string();
                Some(resp)
            }
            "fail" => {
                resp.error = "requested failure".to_string();
                Some(resp)
            }
            _ => {
                resp.generated = format!("  echo: {prompt}\n");
                Some(resp)
            }
        }
    }
}

struct FakeControl {
    signals: watch::Sender<u64>,
    killed: CancellationToken,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl ProcessControl for FakeControl {
    fn id(&self) -> Option<u32> {
        self.task.as_ref().map(|_| 0)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        self.counters.interrupts.fetch_add(1, Ordering::SeqCst);
        self.signals.send_modify(|n| *n += 1);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.counters.kills.fetch_add(1, Ordering::SeqCst);
        self.killed.cancel();
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<()> {
        if let Some(task) = self.task.take() {
            task.await.map_err(io::Error::other)?;
        }
        Ok(())
    }
}

// Mirrors `kill_on_drop` on real children.
impl Drop for FakeControl {
    fn drop(&mut self) {
        self.killed.cancel();
    }
}
