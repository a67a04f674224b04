use std::sync::Arc;

use fanfinder_events::EventBus;
use fanfinder_runner::JobManager;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Job launching, tracking and teardown.
    pub jobs: Arc<JobManager>,
    /// Bus the job manager publishes on; the relay forwards it to sockets.
    pub event_bus: Arc<EventBus>,
}
