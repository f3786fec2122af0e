/// Shared application state passed to axum handlers.
use std::sync::Arc;

use taskboard_core::channels::ChannelRegistry;
use taskboard_core::reconcile::ListDropPolicy;
use taskboard_core::service::BoardService;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BoardService>,
    pub channels: Arc<ChannelRegistry>,
    pub port: u16,
    pub bind_address: String,
    pub drop_policy: ListDropPolicy,
}

impl AppState {
    pub fn new(service: Arc<BoardService>, config: &ServerConfig) -> Self {
        Self {
            channels: Arc::clone(service.channels()),
            service,
            port: config.port,
            bind_address: config.bind_address.clone(),
            drop_policy: config.drop_policy,
        }
    }
}
