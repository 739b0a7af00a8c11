//! Server command - run the ledger API

use anyhow::Result;
use contributor_ledger::config::Config;
use tracing_subscriber::EnvFilter;

pub async fn run(host: Option<String>, port: Option<u16>) -> Result<()> {
    // --verbose may already have installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let mut config = Config::load()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    contributor_ledger::server::serve(config).await
}
