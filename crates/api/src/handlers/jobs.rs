//! Handlers for the `/jobs` resource.
//!
//! These are thin: they parse the request, call [`JobManager`] and wrap the
//! result. Event delivery to sockets happens through the relay, not here.
//!
//! [`JobManager`]: fanfinder_runner::JobManager

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use fanfinder_core::error::CoreError;
use fanfinder_core::instance::InstanceKey;
use fanfinder_core::job_type::JobType;
use fanfinder_core::settings::JobSettings;
use fanfinder_core::types::ObserverId;
use fanfinder_runner::StartRequest;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct StartJobBody {
    pub job_type: String,
    pub instance_number: Option<u32>,
    #[serde(default)]
    pub settings: JobSettings,
    /// WebSocket connection id that should receive launch errors.
    pub observer_id: Option<ObserverId>,
}

fn instance_key(job_type: &str, instance_number: u32) -> Result<InstanceKey, CoreError> {
    InstanceKey::new(JobType::from_str(job_type)?, instance_number)
}

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    DataResponse::new(state.jobs.running())
}

/// GET /api/v1/jobs/status
pub async fn job_status(State(state): State<AppState>) -> impl IntoResponse {
    DataResponse::new(state.jobs.status())
}

/// POST /api/v1/jobs
///
/// Launch an instance. Returns 201 with its key and pid.
pub async fn start_job(
    State(state): State<AppState>,
    Json(body): Json<StartJobBody>,
) -> AppResult<impl IntoResponse> {
    let job_type = JobType::from_str(&body.job_type)?;
    let started = state.jobs.start(StartRequest {
        job_type,
        instance_number: body.instance_number.unwrap_or(1),
        settings: body.settings,
        observer: body.observer_id,
    })?;

    tracing::info!(key = %started.key, pid = started.pid, "Job started via HTTP");

    Ok(DataResponse::created(started))
}

/// GET /api/v1/jobs/{job_type}/{instance_number}
pub async fn get_job(
    State(state): State<AppState>,
    Path((job_type, instance_number)): Path<(String, u32)>,
) -> AppResult<impl IntoResponse> {
    let key = instance_key(&job_type, instance_number)?;
    let summary = state
        .jobs
        .registry()
        .lookup(&key)
        .ok_or_else(|| CoreError::NotFound {
            entity: "Job instance",
            id: key.to_string(),
        })?;
    Ok(DataResponse::new(summary))
}

/// POST /api/v1/jobs/{job_type}/{instance_number}/stop
///
/// Always succeeds for a well-formed key; a job that was not running
/// reports `termination: "not_running"`.
pub async fn stop_job(
    State(state): State<AppState>,
    Path((job_type, instance_number)): Path<(String, u32)>,
) -> AppResult<impl IntoResponse> {
    let key = instance_key(&job_type, instance_number)?;
    let report = state.jobs.stop(key).await;
    Ok(DataResponse::new(report))
}

/// POST /api/v1/jobs/orphans/reap
pub async fn reap_orphans(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.jobs.sweep_orphans().await;
    DataResponse::new(report)
}
