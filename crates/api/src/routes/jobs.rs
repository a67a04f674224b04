//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                                  -> list_jobs
/// POST   /                                  -> start_job
/// GET    /status                            -> job_status
/// GET    /{job_type}/{instance_number}      -> get_job
/// POST   /{job_type}/{instance_number}/stop -> stop_job
/// POST   /orphans/reap                      -> reap_orphans
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::start_job))
        .route("/status", get(jobs::job_status))
        .route("/orphans/reap", post(jobs::reap_orphans))
        .route("/{job_type}/{instance_number}", get(jobs::get_job))
        .route("/{job_type}/{instance_number}/stop", post(jobs::stop_job))
}
