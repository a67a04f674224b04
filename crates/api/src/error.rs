use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fanfinder_core::error::CoreError;
use fanfinder_runner::JobError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`JobError`]. Implements [`IntoResponse`] to
/// produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `fanfinder_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A launch error from `fanfinder_runner`.
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            AppError::Job(job) => match job {
                JobError::InvalidRequest(core) => classify_core_error(core),
                JobError::DuplicateInstance(_) => {
                    (StatusCode::CONFLICT, "DUPLICATE_INSTANCE", job.to_string())
                }
                JobError::ScriptNotFound { searched, .. } => {
                    tracing::error!(error = %job, ?searched, "Worker script missing");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SCRIPT_NOT_FOUND",
                        job.to_string(),
                    )
                }
                JobError::SpawnFailure(_) | JobError::ReadFailure(_) => {
                    tracing::error!(error = %job, "Job process error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SPAWN_FAILED",
                        "Failed to start process".to_string(),
                    )
                }
            },
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
    }
}

#[cfg(test)]
mod tests {
    use fanfinder_core::instance::InstanceKey;
    use fanfinder_core::job_type::JobType;

    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn job_errors_map_to_statuses() {
        let key = InstanceKey::new(JobType::Keyword, 1).unwrap();
        assert_eq!(
            status_of(JobError::DuplicateInstance(key).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(JobError::InvalidRequest(CoreError::Validation("x".into())).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                JobError::ScriptNotFound {
                    script: "keywordSearch.py",
                    searched: vec![],
                }
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn core_errors_map_to_statuses() {
        assert_eq!(
            status_of(
                CoreError::NotFound {
                    entity: "Instance",
                    id: "discovery-1".into(),
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoreError::Validation("Please select a model".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }
}
