//! CLI commands.

pub mod ask;
pub mod generate;
pub mod logcat;
pub mod serve;

use std::path::Path;

use sibyl_cli::ServerConfig;
use sibyl_model_host::ModelHost;
use sibyl_wiki::WikiClient;

/// Load the config file and set up the model host and wiki client it names.
fn open_backends(path: &Path) -> miette::Result<(ServerConfig, ModelHost, WikiClient)> {
    let config = ServerConfig::load(path).map_err(|e| miette::miette!("{}", e))?;
    let host = ModelHost::with_settings(config.model.clone(), config.limits.host_settings())
        .map_err(|e| miette::miette!("{}", e))?;
    let wiki = WikiClient::new(&config.wiki);
    Ok((config, host, wiki))
}
