//! WebSocket message type constants for job lifecycle events.
//!
//! These are the `type` tags of serialized `JobEvent`s and of the
//! connection-level messages sent by the API's WebSocket handler.

/// A job instance was launched and registered.
pub const MSG_TYPE_JOB_STARTED: &str = "job_started";

/// A raw output line from a running job (or a status line about it).
pub const MSG_TYPE_JOB_OUTPUT: &str = "job_output";

/// Collection progress parsed from a job's output.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// A single user was collected by a job.
pub const MSG_TYPE_USER_COLLECTED: &str = "user_collected";

/// A job was stopped on request (terminal).
pub const MSG_TYPE_JOB_STOPPED: &str = "job_stopped";

/// A job's process exited on its own (terminal).
pub const MSG_TYPE_JOB_FINISHED: &str = "job_finished";

/// A job could not be launched, or failed while running.
pub const MSG_TYPE_JOB_ERROR: &str = "job_error";

/// Jobs of the named type may be started again from the UI.
pub const MSG_TYPE_JOB_TYPE_UNBLOCKED: &str = "job_type_unblocked";

/// Snapshot of what is running, sent to a socket right after it connects.
pub const MSG_TYPE_JOB_STATUS_UPDATE: &str = "job_status_update";

/// Sent to a socket right after it connects.
pub const MSG_TYPE_CONNECTION_CONFIRMED: &str = "connection_confirmed";

/// Reply to a client `ping` message.
pub const MSG_TYPE_PONG: &str = "pong";

/// Sent to a socket whose message could not be understood.
pub const MSG_TYPE_ERROR: &str = "error";
