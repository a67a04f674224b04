use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanfinder_api::config::ServerConfig;
use fanfinder_api::relay::EventRelay;
use fanfinder_api::router::build_app_router;
use fanfinder_api::state::AppState;
use fanfinder_api::ws::WsManager;
use fanfinder_events::EventBus;
use fanfinder_runner::JobManager;

/// Interval between WebSocket heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fanfinder_api=debug,fanfinder_runner=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        interpreter = %config.runner.interpreter,
        "Loaded server configuration"
    );

    // --- Event bus and job manager ---
    let event_bus = Arc::new(EventBus::default());
    let jobs = Arc::new(JobManager::new(config.runner.clone(), Arc::clone(&event_bus)));

    // Browsers left behind by a previous run of this server.
    let swept = jobs.sweep_orphans().await;
    tracing::info!(
        scanned = swept.scanned,
        candidates = swept.candidates,
        killed = swept.killed,
        "Startup orphan sweep finished"
    );

    // --- WebSocket manager ---
    let ws_manager = Arc::new(WsManager::new());
    let heartbeat_handle = Arc::clone(&ws_manager).spawn_heartbeat(HEARTBEAT_INTERVAL);

    // --- Event relay (bus -> sockets) ---
    let relay_cancel = CancellationToken::new();
    let relay = EventRelay::new(Arc::clone(&ws_manager), Arc::clone(&jobs));
    let relay_handle = tokio::spawn(relay.run(event_bus.subscribe(), relay_cancel.clone()));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        jobs: Arc::clone(&jobs),
        event_bus,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let cleanup = Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(cleanup, jobs.shutdown()).await {
        Ok((stopped, reaped)) => {
            tracing::info!(
                stopped = stopped.len(),
                orphans_killed = reaped.killed,
                "Job instances shut down"
            );
        }
        Err(_) => {
            tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Job shutdown timed out");
        }
    }

    // Let the relay deliver the stop events before the sockets close.
    relay_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), relay_handle).await;
    tracing::info!("Event relay stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
