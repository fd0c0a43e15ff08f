//! The model host: token counting and generation over the pooled process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sibyl_core::{Context, GenerateRequest, LogEntry, ModelRequest, TokenCountRequest};
use tracing::{debug, info};

use crate::config::{HostSettings, ModelConfig};
use crate::connection::Connection;
use crate::error::HostError;
use crate::launcher::{CommandLauncher, Launcher};
use crate::slot::Slot;

/// Owns the model process and serializes every call onto it.
///
/// Cloning is cheap; all clones share the same process.
#[derive(Clone)]
pub struct ModelHost {
    shared: Arc<Shared>,
}

struct Shared {
    config: ModelConfig,
    settings: HostSettings,
    launcher: Box<dyn Launcher>,
    slot: Slot,
    next_id: AtomicU64,
}

impl ModelHost {
    /// Create a host for the configured binary with default settings.
    pub fn new(config: ModelConfig) -> Result<Self, HostError> {
        Self::with_settings(config, HostSettings::default())
    }

    pub fn with_settings(config: ModelConfig, settings: HostSettings) -> Result<Self, HostError> {
        Self::with_launcher(config, settings, CommandLauncher)
    }

    /// Create a host that starts processes through a custom launcher.
    pub fn with_launcher(
        config: ModelConfig,
        settings: HostSettings,
        launcher: impl Launcher,
    ) -> Result<Self, HostError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                settings,
                launcher: Box::new(launcher),
                slot: Slot::new(),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.shared.config
    }

    /// Count the tokens `prompt` encodes to.
    pub async fn count_tokens(&self, ctx: &Context, prompt: &str) -> Result<usize, HostError> {
        let req = TokenCountRequest {
            prompt: prompt.to_string(),
        };
        let resp = self.run(ctx, &req).await?;
        usize::try_from(resp.token_count)
            .map_err(|_| HostError::Model(format!("invalid token count {}", resp.token_count)))
    }

    /// Generate a continuation of `prompt`, recording the exchange in `log`.
    pub async fn generate(
        &self,
        ctx: &Context,
        prompt: &str,
        log: &mut LogEntry,
    ) -> Result<String, HostError> {
        let req = GenerateRequest {
            prompt: prompt.to_string(),
        };
        let resp = self.run(ctx, &req).await?;
        let generated = resp.generated.trim().to_string();
        log.record_generation(prompt, generated.as_str());
        Ok(generated)
    }

    /// Stop the model process, if one is running.
    pub async fn shutdown(&self) {
        let Ok(mut guard) = self.shared.slot.checkout(&Context::background()).await else {
            return;
        };
        if let Some(conn) = guard.take() {
            info!("shutting down model process {}", conn.id());
            conn.close().await;
        }
    }

    async fn run<R: ModelRequest>(&self, ctx: &Context, req: &R) -> Result<R::Response, HostError> {
        let mut guard = self.shared.slot.checkout(ctx).await?;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect(ctx).await?,
        };

        match conn.call(ctx, req).await {
            Ok(resp) => {
                *guard = Some(conn);
                Ok(resp)
            }
            Err(failure) if failure.discard => {
                info!(
                    "discarding model process {} after error: {}",
                    conn.id(),
                    failure.error
                );
                conn.close().await;
                Err(failure.error)
            }
            Err(failure) => {
                *guard = Some(conn);
                Err(failure.error)
            }
        }
    }

    async fn connect(&self, ctx: &Context) -> Result<Connection, HostError> {
        let shared = &self.shared;
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let worker = shared.launcher.launch(&shared.config)?;
        debug!(
            "starting model process {} (PID: {:?})",
            id,
            worker.control.id()
        );
        let conn = Connection::open(
            id,
            worker,
            ctx,
            &shared.config.data_dir,
            shared.settings.grace_period,
        )
        .await?;
        conn.watch_idle(shared.slot.downgrade(), shared.settings.idle_timeout);
        info!("model process {} ready", id);
        Ok(conn)
    }
}
