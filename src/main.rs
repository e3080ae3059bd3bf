mod config;
mod game;
mod net;
mod session;
mod store;
mod util;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Level};

use crate::config::ServerConfig;
use crate::game::match_state::GameMode;
use crate::session::SessionRegistry;
use crate::store::MemoryStore;

/// Headless soak harness: boots the session registry, runs one FFA session,
/// and logs simulation status until Ctrl+C. A transport collaborator embeds
/// the library instead of running this binary.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Nebula Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}:{}, max_sessions={}",
        config.bind_address, config.port, config.max_sessions
    );

    let registry = SessionRegistry::with_store(
        config.max_sessions,
        Duration::from_secs(config.session_idle_secs),
        Arc::new(MemoryStore::new()),
    );

    let session = registry
        .create_session("Battle Arena", GameMode::Ffa)
        .map_err(anyhow::Error::new)?;
    info!("Default session ready: {}", session.id);

    let status_registry = registry.clone();
    let status = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            for row in status_registry.list() {
                info!(
                    "session {} ({}): {} players",
                    row.id, row.name, row.players
                );
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    status.abort();
    registry.shutdown_all();
    info!("Server stopped");

    Ok(())
}
