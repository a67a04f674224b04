//! Stopping a running instance.
//!
//! Order matters here. Browser children are snapshotted while the worker is
//! still alive, because once it dies they are reparented and can no longer
//! be attributed to it. Then the worker gets SIGTERM, a grace period, and
//! SIGKILL. Finally the snapshotted browsers are killed and the instance is
//! removed from the registry. A stop of an absent instance publishes one
//! `job_stopped`; a stop that finds another stop in flight waits for it and
//! publishes nothing, so `job_stopped` stays the last event for the key.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use fanfinder_core::browser::BrowserSignature;
use fanfinder_core::instance::InstanceKey;
use fanfinder_core::job_type::JobType;
use fanfinder_events::{EventBus, JobEvent};
use serde::Serialize;
use tokio::process::Child;

use crate::process_table::{self, KillOutcome, ProcessInfo, Scope};
use crate::reader::SupervisorExit;
use crate::registry::{InstanceRegistry, StopClaim};

/// How the worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No such instance.
    NotRunning,
    /// Exited on its own before it could be signalled.
    AlreadyExited,
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Killed after the grace period ran out.
    Forced,
    /// The supervisor task died; its child was killed when dropped.
    Abandoned,
    /// Could not be killed.
    Failed,
}

/// Outcome of one stop request.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub key: String,
    pub job_type: JobType,
    pub instance_number: u32,
    pub pid: Option<u32>,
    pub termination: Termination,
    pub browsers_found: usize,
    pub browsers_killed: usize,
}

impl StopReport {
    pub(crate) fn not_running(key: &InstanceKey) -> Self {
        Self {
            key: key.to_string(),
            job_type: key.job_type,
            instance_number: key.instance_number,
            pid: None,
            termination: Termination::NotRunning,
            browsers_found: 0,
            browsers_killed: 0,
        }
    }

    pub fn was_running(&self) -> bool {
        self.termination != Termination::NotRunning
    }
}

pub struct StopController {
    registry: Arc<InstanceRegistry>,
    bus: Arc<EventBus>,
    signature: BrowserSignature,
    grace: Duration,
}

impl StopController {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        bus: Arc<EventBus>,
        signature: BrowserSignature,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            bus,
            signature,
            grace,
        }
    }

    /// Stop `key` and clean up after it.
    ///
    /// Never fails: an absent instance still gets a `job_stopped` event so
    /// observers can reset their state. A stop already in flight is joined
    /// and its report returned.
    pub async fn stop(&self, key: InstanceKey) -> StopReport {
        let prefix = key.log_prefix();
        tracing::info!(key = %key, "{prefix} Stop requested");

        let ticket = match self.registry.begin_stop(&key) {
            StopClaim::Claimed(ticket) => ticket,
            StopClaim::InProgress(mut stopped) => {
                tracing::info!(key = %key, "{prefix} Already stopping, waiting");
                let report = stopped
                    .wait_for(Option::is_some)
                    .await
                    .ok()
                    .and_then(|report| Option::clone(&report));
                if let Some(report) = report {
                    return report;
                }
                tracing::warn!(key = %key, "{prefix} Stop in flight was abandoned");
                self.bus.broadcast(JobEvent::stopped(&key));
                return StopReport::not_running(&key);
            }
            StopClaim::Absent => {
                tracing::info!(key = %key, "{prefix} Not running, nothing to stop");
                self.bus.broadcast(JobEvent::stopped(&key));
                return StopReport::not_running(&key);
            }
        };

        self.say(
            &key,
            format!("{prefix} Stopping {} script (PID: {})...", key.job_type.label(), ticket.pid),
        );

        let browsers = self.find_browsers(ticket.pid).await;
        for browser in &browsers {
            tracing::info!(key = %key, pid = browser.pid, name = %browser.name, "{prefix} Tracking browser process");
        }

        ticket.cancel.cancel();
        let exit = match ticket.task {
            Some(task) => match task.await {
                Ok(exit) => Some(exit),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "{prefix} Supervisor task failed");
                    None
                }
            },
            None => None,
        };

        let termination = match exit {
            Some(SupervisorExit::Cancelled(mut child)) => terminate(&mut child, self.grace).await,
            Some(SupervisorExit::Exited(_)) | Some(SupervisorExit::Finalized) => Termination::AlreadyExited,
            None => Termination::Abandoned,
        };

        match termination {
            Termination::Graceful => self.say(&key, format!("{prefix} [OK] Process terminated gracefully")),
            Termination::Forced => self.say(&key, format!("{prefix} [WARN] Process force killed")),
            Termination::AlreadyExited => self.say(&key, format!("{prefix} [OK] Process already exited")),
            Termination::Failed => self.say(&key, format!("{prefix} [ERROR] Failed to kill process")),
            Termination::Abandoned | Termination::NotRunning => {}
        }

        let browsers_killed = self.kill_browsers(&browsers).await;
        if browsers.is_empty() {
            self.say(&key, format!("{prefix} [OK] No browser processes to clean up"));
        } else {
            self.say(
                &key,
                format!("{prefix} [OK] Cleaned up {browsers_killed} of {} browser processes", browsers.len()),
            );
        }

        self.registry.remove(&key);

        tracing::info!(
            key = %key,
            pid = ticket.pid,
            ?termination,
            browsers_found = browsers.len(),
            browsers_killed,
            "{prefix} Stopped"
        );
        self.say(
            &key,
            format!(
                "{prefix} [OK] {} script instance {} stopped",
                key.job_type.label(),
                key.instance_number
            ),
        );
        self.bus.broadcast(JobEvent::stopped(&key));
        for other in key.job_type.others() {
            self.bus.broadcast(JobEvent::unblocked(other));
        }

        let report = StopReport {
            key: key.to_string(),
            job_type: key.job_type,
            instance_number: key.instance_number,
            pid: Some(ticket.pid),
            termination,
            browsers_found: browsers.len(),
            browsers_killed,
        };
        ticket.done.send_replace(Some(report.clone()));
        report
    }

    fn say(&self, key: &InstanceKey, line: String) {
        self.bus.broadcast(JobEvent::output(key, line));
    }

    async fn find_browsers(&self, pid: u32) -> Vec<ProcessInfo> {
        let signature = self.signature.clone();
        tokio::task::spawn_blocking(move || {
            process_table::find_blocking(&signature, Scope::DescendantsOf(pid))
        })
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(pid, error = %e, "Browser snapshot failed");
            Vec::new()
        })
    }

    /// Kill the snapshotted browsers; ones already gone count as cleaned up.
    async fn kill_browsers(&self, browsers: &[ProcessInfo]) -> usize {
        if browsers.is_empty() {
            return 0;
        }
        let pids: Vec<u32> = browsers.iter().map(|b| b.pid).collect();
        let signature = self.signature.clone();
        let outcomes = tokio::task::spawn_blocking(move || process_table::kill_blocking(&pids, &signature))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Browser cleanup failed");
                Vec::new()
            });

        outcomes
            .into_iter()
            .filter(|(pid, outcome)| match outcome {
                KillOutcome::Killed | KillOutcome::Gone => true,
                KillOutcome::Failed => {
                    tracing::warn!(pid, "Failed to kill browser process");
                    false
                }
            })
            .count()
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) -> Termination {
    if let Ok(Some(_)) = child.try_wait() {
        return Termination::AlreadyExited;
    }

    if let Err(e) = send_terminate(child) {
        tracing::warn!(error = %e, "Failed to send SIGTERM");
    }

    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return Termination::Graceful;
    }

    match tokio::time::timeout(grace.max(Duration::from_secs(1)), child.kill()).await {
        Ok(Ok(())) => Termination::Forced,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to kill worker");
            Termination::Failed
        }
        Err(_) => {
            tracing::error!("Worker did not exit after SIGKILL");
            Termination::Failed
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: kill(2) takes plain integers and touches no memory.
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
