use std::path::PathBuf;

use fanfinder_core::error::CoreError;
use fanfinder_core::instance::InstanceKey;

/// Errors raised while launching or running a job.
///
/// Launch-time variants are returned to the caller and never leave a trace
/// in the registry. `ReadFailure` only ever surfaces as a `job_error` event.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The request was malformed (bad job type, instance number or settings).
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    /// An instance with this key is already live.
    #[error("Instance {0} is already running")]
    DuplicateInstance(InstanceKey),

    /// No candidate directory contains the worker script.
    #[error("Script {script} not found in any expected location")]
    ScriptNotFound {
        script: &'static str,
        searched: Vec<PathBuf>,
    },

    /// The OS refused to start the worker process.
    #[error("Failed to start process: {0}")]
    SpawnFailure(#[source] std::io::Error),

    /// Reading the worker's output failed mid-run.
    #[error("Failed to read job output: {0}")]
    ReadFailure(#[source] std::io::Error),
}
