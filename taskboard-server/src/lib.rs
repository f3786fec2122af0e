/// Taskboard server: config loading, store init, HTTP + WebSocket server.
mod api;
mod channel_ws;
pub mod config;
mod log_bridge;
pub mod server;
pub mod state;
pub mod sync_client;

use std::sync::Arc;

use taskboard_core::cascade;
use taskboard_core::channels::ChannelRegistry;
use taskboard_core::service::BoardService;
use taskboard_core::storage::{JsonFile, StorageError, Store};

use crate::config::ServerConfig;
use crate::state::AppState;

/// Open the store the config names, finishing any board deletion an
/// earlier run left half done.
pub fn open_store(config: &ServerConfig) -> Result<Store, StorageError> {
    let store = if config.in_memory {
        log::info!(target: "taskboard.server", "Using in-memory store");
        Store::in_memory()
    } else {
        let path = config.data_path();
        log::info!(target: "taskboard.server", "Using store at {}", path.display());
        Store::open(Box::new(JsonFile::new(path)))?
    };

    for (board_id, result) in cascade::resume_pending(&store) {
        match result {
            Ok(report) => log::info!(
                target: "taskboard.server",
                "Finished deletion of board {}: {:?}",
                board_id,
                report
            ),
            Err(e) => log::error!(
                target: "taskboard.server",
                "Deletion of board {} still incomplete: {}",
                board_id,
                e
            ),
        }
    }
    Ok(store)
}

/// Wire the store, channel registry and service into handler state.
pub fn build_state(config: &ServerConfig) -> Result<AppState, StorageError> {
    let store = Arc::new(open_store(config)?);
    let channels = Arc::new(ChannelRegistry::new());
    let service = Arc::new(BoardService::new(store, channels));
    Ok(AppState::new(service, config))
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = log_bridge::init() {
        log_bridge::write_fallback_line(&format!("failed to initialize server logger: {}", e));
    }

    let config_path = config::default_config_path();
    let config = config::load_config(&config_path);
    log::info!(
        target: "taskboard.server",
        "Config {}: port={} bind={} drop_policy={:?}",
        config_path.display(),
        config.port,
        config.bind_address,
        config.drop_policy
    );

    let state = build_state(&config)?;
    let (port, shutdown_tx) = server::spawn_server(state).await?;
    log::info!(target: "taskboard.server", "Taskboard server ready on port {}", port);

    tokio::signal::ctrl_c().await?;
    log::info!(target: "taskboard.server", "Shutting down");
    let _ = shutdown_tx.send(true);
    Ok(())
}
