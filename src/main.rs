//! Contributor Ledger Server
//!
//! Serves the ledger API over PostgreSQL when DATABASE_URL is set, otherwise
//! over an embedded SQLite file.

use contributor_ledger::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Contributor Ledger Server");

    let config = Config::load()?;
    contributor_ledger::server::serve(config).await?;

    Ok(())
}
