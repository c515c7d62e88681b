use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gavel_core::{
    engine::AuctionEngine,
    events::{DealLedger, EventListener, LogListener},
    store::MemoryStore,
};
use gavel_server::{
    config::{DEFAULT_CONFIG_PATH, load_or_default},
    routes,
};

#[derive(Debug, Parser)]
#[command(name = "gavel-server", about = "Auction bidding and closing engine", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: PathBuf,

    /// Listen address, overriding the config file
    #[arg(long, env = "GAVEL_LISTEN", value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;
    let listen = cli.listen.unwrap_or_else(|| config.server.listen.clone());

    let listeners: Vec<Arc<dyn EventListener>> =
        vec![Arc::new(DealLedger::new()), Arc::new(LogListener)];
    let engine = Arc::new(AuctionEngine::new(
        Arc::new(MemoryStore::new()),
        listeners,
        config.engine_config(),
    ));

    let app = routes::router(engine);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(%listen, "gavel server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
