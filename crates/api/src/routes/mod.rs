pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                        WebSocket
/// /jobs                                      list, start
/// /jobs/status                               legacy status snapshot
/// /jobs/orphans/reap                         manual orphan sweep
/// /jobs/{job_type}/{instance_number}         get
/// /jobs/{job_type}/{instance_number}/stop    stop
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
}
