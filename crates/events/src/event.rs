//! Typed job events and their audiences.

use chrono::Utc;
use fanfinder_core::instance::InstanceKey;
use fanfinder_core::job_events::{
    MSG_TYPE_JOB_ERROR, MSG_TYPE_JOB_FINISHED, MSG_TYPE_JOB_OUTPUT, MSG_TYPE_JOB_PROGRESS,
    MSG_TYPE_JOB_STARTED, MSG_TYPE_JOB_STOPPED, MSG_TYPE_JOB_TYPE_UNBLOCKED,
    MSG_TYPE_USER_COLLECTED,
};
use fanfinder_core::job_type::JobType;
use fanfinder_core::progress::ProgressLine;
use fanfinder_core::types::{ObserverId, Timestamp};
use serde::{Deserialize, Serialize};

/// Who receives a published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Audience {
    /// Every connected observer.
    All,
    /// Only the observer that made the request.
    Observer(ObserverId),
}

impl Audience {
    /// Send to `observer` if known, otherwise to everyone.
    pub fn requester(observer: Option<&ObserverId>) -> Self {
        match observer {
            Some(id) => Self::Observer(id.clone()),
            None => Self::All,
        }
    }
}

/// An event in the life of a job instance.
///
/// Serializes with a `type` tag matching the constants in
/// [`fanfinder_core::job_events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobStarted {
        job_type: JobType,
        instance_number: u32,
        pid: u32,
        timestamp: Timestamp,
    },
    JobOutput {
        job_type: JobType,
        instance_number: u32,
        line: String,
        timestamp: Timestamp,
    },
    JobProgress {
        job_type: JobType,
        instance_number: u32,
        collected: u32,
        target: u32,
        percent: f64,
    },
    UserCollected {
        job_type: JobType,
        instance_number: u32,
        username: String,
        timestamp: Timestamp,
    },
    JobStopped {
        job_type: JobType,
        instance_number: u32,
        timestamp: Timestamp,
    },
    JobFinished {
        job_type: JobType,
        instance_number: u32,
        success: bool,
        /// Process exit code (`-1` if killed by signal).
        exit_code: i32,
        collected: u32,
        timestamp: Timestamp,
    },
    JobError {
        job_type: JobType,
        instance_number: u32,
        error: String,
        timestamp: Timestamp,
    },
    JobTypeUnblocked {
        job_type: JobType,
        timestamp: Timestamp,
    },
}

impl JobEvent {
    pub fn started(key: &InstanceKey, pid: u32) -> Self {
        Self::JobStarted {
            job_type: key.job_type,
            instance_number: key.instance_number,
            pid,
            timestamp: Utc::now(),
        }
    }

    pub fn output(key: &InstanceKey, line: impl Into<String>) -> Self {
        Self::JobOutput {
            job_type: key.job_type,
            instance_number: key.instance_number,
            line: line.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn progress(key: &InstanceKey, progress: &ProgressLine) -> Self {
        Self::JobProgress {
            job_type: key.job_type,
            instance_number: key.instance_number,
            collected: progress.collected,
            target: progress.target,
            percent: progress.percent,
        }
    }

    pub fn user_collected(key: &InstanceKey, username: impl Into<String>) -> Self {
        Self::UserCollected {
            job_type: key.job_type,
            instance_number: key.instance_number,
            username: username.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn stopped(key: &InstanceKey) -> Self {
        Self::JobStopped {
            job_type: key.job_type,
            instance_number: key.instance_number,
            timestamp: Utc::now(),
        }
    }

    pub fn finished(key: &InstanceKey, exit_code: i32, collected: u32) -> Self {
        Self::JobFinished {
            job_type: key.job_type,
            instance_number: key.instance_number,
            success: exit_code == 0,
            exit_code,
            collected,
            timestamp: Utc::now(),
        }
    }

    pub fn error(key: &InstanceKey, error: impl Into<String>) -> Self {
        Self::JobError {
            job_type: key.job_type,
            instance_number: key.instance_number,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn unblocked(job_type: JobType) -> Self {
        Self::JobTypeUnblocked {
            job_type,
            timestamp: Utc::now(),
        }
    }

    /// The `type` tag this event serializes with.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => MSG_TYPE_JOB_STARTED,
            Self::JobOutput { .. } => MSG_TYPE_JOB_OUTPUT,
            Self::JobProgress { .. } => MSG_TYPE_JOB_PROGRESS,
            Self::UserCollected { .. } => MSG_TYPE_USER_COLLECTED,
            Self::JobStopped { .. } => MSG_TYPE_JOB_STOPPED,
            Self::JobFinished { .. } => MSG_TYPE_JOB_FINISHED,
            Self::JobError { .. } => MSG_TYPE_JOB_ERROR,
            Self::JobTypeUnblocked { .. } => MSG_TYPE_JOB_TYPE_UNBLOCKED,
        }
    }

    /// The instance this event belongs to, if it is instance-scoped.
    pub fn instance(&self) -> Option<InstanceKey> {
        let (job_type, instance_number) = match self {
            Self::JobStarted {
                job_type,
                instance_number,
                ..
            }
            | Self::JobOutput {
                job_type,
                instance_number,
                ..
            }
            | Self::JobProgress {
                job_type,
                instance_number,
                ..
            }
            | Self::UserCollected {
                job_type,
                instance_number,
                ..
            }
            | Self::JobStopped {
                job_type,
                instance_number,
                ..
            }
            | Self::JobFinished {
                job_type,
                instance_number,
                ..
            }
            | Self::JobError {
                job_type,
                instance_number,
                ..
            } => (*job_type, *instance_number),
            Self::JobTypeUnblocked { .. } => return None,
        };
        Some(InstanceKey {
            job_type,
            instance_number,
        })
    }

    /// Whether this is the last event an instance will produce.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobStopped { .. } | Self::JobFinished { .. })
    }
}
