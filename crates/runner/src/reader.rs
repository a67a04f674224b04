//! Per-instance supervisor task.
//!
//! Reads the worker's merged output, publishing a `job_output` event per
//! non-blank line and progress events for lines matching the progress
//! pattern. When the process exits on its own, the supervisor removes the
//! instance from the registry and publishes `job_finished`. Exit is noticed
//! even if a descendant keeps the output pipes open.
//!
//! If a stop claims the instance first, the supervisor hands the child back
//! through its [`SupervisorExit`] and publishes nothing further; the stop
//! controller owns the terminal event from then on.

use std::io;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fanfinder_core::instance::InstanceKey;
use fanfinder_core::progress::parse_progress;
use fanfinder_events::{EventBus, JobEvent};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::launcher::OutputLine;
use crate::registry::InstanceRegistry;

/// Lines containing any of these are logged at info level instead of debug.
const NOTABLE_MARKERS: &[&str] = &["error", "failed", "collected user", "new user found", "[ok]"];

/// How long output is still read after the process has exited.
const DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// How a supervisor task ended.
#[derive(Debug)]
pub enum SupervisorExit {
    /// Cancelled by a stop; the stop controller now owns the child.
    Cancelled(Child),
    /// The process exited while a stop was already in progress.
    Exited(i32),
    /// Exited naturally; the instance was removed and `job_finished` sent.
    Finalized,
}

pub(crate) struct Supervisor {
    pub key: InstanceKey,
    pub child: Child,
    pub lines: mpsc::Receiver<OutputLine>,
    pub registry: Arc<InstanceRegistry>,
    pub bus: Arc<EventBus>,
    pub collected: Arc<AtomicU32>,
    pub cancel: CancellationToken,
}

impl Supervisor {
    /// Run until the process exits or a stop takes over.
    ///
    /// Nothing is read before `ready` fires, so `job_started` is always the
    /// first event of an instance. A dropped `ready` means the launch was
    /// abandoned; the child is handed back and killed on drop.
    pub async fn run(mut self, ready: oneshot::Receiver<()>) -> SupervisorExit {
        if ready.await.is_err() {
            return SupervisorExit::Cancelled(self.child);
        }

        let prefix = self.key.log_prefix();

        let mut exited = None;
        let read_failure = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SupervisorExit::Cancelled(self.child),
                next = self.lines.recv() => match next {
                    Some(Ok(line)) => self.handle_line(&prefix, &line),
                    Some(Err(e)) => break Some(e),
                    None => break None,
                },
                status = self.child.wait() => {
                    exited = Some(status);
                    break self.drain(&prefix).await;
                }
            }
        };

        if let Some(err) = read_failure {
            let err = JobError::ReadFailure(err);
            tracing::error!(key = %self.key, error = %err, "{prefix} Output reader failed");
            self.bus.broadcast(JobEvent::error(&self.key, err.to_string()));
            if exited.is_none() {
                if let Err(e) = self.child.start_kill() {
                    tracing::warn!(key = %self.key, error = %e, "{prefix} Failed to kill worker");
                }
            }
        }

        let status = match exited {
            Some(status) => status,
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SupervisorExit::Cancelled(self.child),
                status = self.child.wait() => status,
            },
        };
        let exit_code = match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "{prefix} Failed to wait for worker");
                -1
            }
        };

        self.finalize(&prefix, exit_code)
    }

    /// Read what is still queued after the process exited.
    ///
    /// Stops at EOF or after [`DRAIN_WINDOW`], whichever comes first. A
    /// descendant holding the pipes open does not keep the instance alive.
    async fn drain(&mut self, prefix: &str) -> Option<io::Error> {
        let deadline = tokio::time::Instant::now() + DRAIN_WINDOW;
        loop {
            match tokio::time::timeout_at(deadline, self.lines.recv()).await {
                Ok(Some(Ok(line))) => self.handle_line(prefix, &line),
                Ok(Some(Err(e))) => return Some(e),
                Ok(None) => return None,
                Err(_) => {
                    tracing::debug!(key = %self.key, "{prefix} Output still open after exit, detaching");
                    return None;
                }
            }
        }
    }

    fn handle_line(&self, prefix: &str, line: &str) {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return;
        }

        let lower = line.to_lowercase();
        if NOTABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            tracing::info!(key = %self.key, "{prefix} {line}");
        } else {
            tracing::debug!(key = %self.key, "{prefix} {line}");
        }

        self.bus.broadcast(JobEvent::output(&self.key, line));

        if let Some(progress) = parse_progress(line) {
            self.collected.store(progress.collected, Ordering::Relaxed);
            tracing::info!(
                key = %self.key,
                username = %progress.username,
                collected = progress.collected,
                target = progress.target,
                "{prefix} User collected"
            );
            self.bus
                .broadcast(JobEvent::user_collected(&self.key, progress.username.as_str()));
            self.bus.broadcast(JobEvent::progress(&self.key, &progress));
        }
    }

    fn finalize(&self, prefix: &str, exit_code: i32) -> SupervisorExit {
        if self.registry.finish(&self.key).is_none() {
            tracing::debug!(key = %self.key, exit_code, "{prefix} Exited during stop");
            return SupervisorExit::Exited(exit_code);
        }

        let collected = self.collected.load(Ordering::Relaxed);
        let summary = if exit_code == 0 {
            tracing::info!(key = %self.key, collected, "{prefix} Worker completed");
            format!("{prefix} [OK] Script completed successfully! Collected {collected} users.")
        } else {
            tracing::warn!(key = %self.key, exit_code, collected, "{prefix} Worker failed");
            format!("{prefix} [ERROR] Script failed with exit code {exit_code}")
        };

        self.bus.broadcast(JobEvent::output(&self.key, summary));
        self.bus
            .broadcast(JobEvent::finished(&self.key, exit_code, collected));
        for other in self.key.job_type.others() {
            self.bus.broadcast(JobEvent::unblocked(other));
        }
        SupervisorExit::Finalized
    }
}

/// Exit code of a finished process; `-1` when it was killed by a signal.
pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
        // Terminated by SIGKILL.
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), -1);
    }
}
