//! Serve command - run the HTTP API until interrupted.

use std::path::Path;
use std::sync::Arc;

use sibyl_cli::{Api, LogWriter};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Entries buffered for the log writer before requests start waiting on it.
const LOG_QUEUE: usize = 16;

pub async fn run(config_path: &Path) -> miette::Result<()> {
    let (config, host, wiki) = super::open_backends(config_path)?;

    let log = match &config.log_file {
        Some(path) => Some(
            LogWriter::open(path, config.limits.log_chunk_bytes, LOG_QUEUE)
                .await
                .map_err(|e| miette::miette!("Failed to open {}: {}", path.display(), e))?,
        ),
        None => None,
    };

    let api = Api::new(
        Arc::new(host.clone()),
        Arc::new(wiki),
        config.flow.clone(),
        config.limits.clone(),
        log,
    );

    let listener = TcpListener::bind(&config.listen)
        .await
        .map_err(|e| miette::miette!("Failed to listen on {}: {}", config.listen, e))?;
    info!("listening on {}", config.listen);

    let served = axum::serve(listener, api.router())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("shutting down");
    if let Err(e) = api.close_log().await {
        warn!("request log: {}", e);
    }
    host.shutdown().await;

    served.map_err(|e| miette::miette!("Server error: {}", e))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
