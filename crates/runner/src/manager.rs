//! [`JobManager`]: the entry point for starting, stopping and inspecting jobs.
//!
//! Launch-time failures are returned to the caller *and* published as a
//! `job_error` to the requesting observer only. Everything that happens
//! after a successful launch is published to all observers.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use fanfinder_core::instance::InstanceKey;
use fanfinder_core::job_type::JobType;
use fanfinder_core::settings::JobSettings;
use fanfinder_core::types::ObserverId;
use fanfinder_events::{Audience, EventBus, JobEvent};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::RunnerConfig;
use crate::error::JobError;
use crate::launcher::Launcher;
use crate::reader::Supervisor;
use crate::reaper::{OrphanReaper, ReapReport};
use crate::registry::{InstanceRegistry, InstanceSummary, RunningInstance};
use crate::stop::{StopController, StopReport};

/// A request to launch one instance.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub job_type: JobType,
    pub instance_number: u32,
    pub settings: JobSettings,
    /// Connection that asked; launch errors are sent only to it.
    pub observer: Option<ObserverId>,
}

/// A successfully launched instance.
#[derive(Debug, Clone, Serialize)]
pub struct StartedJob {
    pub key: String,
    pub job_type: JobType,
    pub instance_number: u32,
    pub pid: u32,
}

/// Legacy single-job status view: whether anything runs, and the most
/// recently started instance.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub job_type: Option<JobType>,
    pub pid: Option<u32>,
    pub instances: Vec<InstanceSummary>,
}

pub struct JobManager {
    launcher: Launcher,
    registry: Arc<InstanceRegistry>,
    bus: Arc<EventBus>,
    stopper: Arc<StopController>,
    reaper: OrphanReaper,
}

impl JobManager {
    pub fn new(config: RunnerConfig, bus: Arc<EventBus>) -> Self {
        let registry = Arc::new(InstanceRegistry::new());
        let launcher = Launcher::new(config.interpreter, config.script_dirs);
        let stopper = Arc::new(StopController::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            config.signature.clone(),
            config.stop_grace,
        ));
        let reaper = OrphanReaper::new(config.signature, config.reaper);
        Self {
            launcher,
            registry,
            bus,
            stopper,
            reaper,
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Launch an instance.
    ///
    /// Must be called from within a Tokio runtime. On success the instance
    /// is registered and `job_started` has been published before this
    /// returns; no output event can precede it.
    pub fn start(&self, request: StartRequest) -> Result<StartedJob, JobError> {
        let StartRequest {
            job_type,
            instance_number,
            settings,
            observer,
        } = request;
        let reply_to = Audience::requester(observer.as_ref());

        let key = match InstanceKey::new(job_type, instance_number) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(job_type = %job_type, instance_number, error = %e, "Rejected start request");
                return Err(e.into());
            }
        };

        match self.launch(key, &settings, observer, &reply_to) {
            Ok(started) => Ok(started),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "{} Failed to start", key.log_prefix());
                self.bus
                    .publish(reply_to, JobEvent::error(&key, e.to_string()));
                Err(e)
            }
        }
    }

    fn launch(
        &self,
        key: InstanceKey,
        settings: &JobSettings,
        observer: Option<ObserverId>,
        reply_to: &Audience,
    ) -> Result<StartedJob, JobError> {
        settings.check()?;
        let reservation = self.registry.reserve(key)?;

        let prefix = key.log_prefix();
        self.bus.publish(
            reply_to.clone(),
            JobEvent::output(&key, format!("{prefix} Starting {} script...", key.job_type)),
        );

        let launched = self.launcher.launch(key.job_type, settings)?;
        let pid = launched.pid;

        let collected = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let supervisor = Supervisor {
            key,
            child: launched.child,
            lines: launched.lines,
            registry: Arc::clone(&self.registry),
            bus: Arc::clone(&self.bus),
            collected: Arc::clone(&collected),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run(ready_rx));

        reservation.commit(RunningInstance::new(
            key,
            pid,
            settings.target_users,
            observer,
            collected,
            cancel,
            task,
        ));

        tracing::info!(key = %key, pid, script = %launched.script.display(), "{prefix} Process started");
        self.bus.broadcast(JobEvent::started(&key, pid));
        self.bus
            .broadcast(JobEvent::output(&key, format!("{prefix} [OK] Process started (PID: {pid})")));
        // The supervisor only starts reading once job_started is out.
        let _ = ready_tx.send(());

        Ok(StartedJob {
            key: key.to_string(),
            job_type: key.job_type,
            instance_number: key.instance_number,
            pid,
        })
    }

    /// Stop one instance. See [`StopController::stop`].
    ///
    /// The stop runs on its own task, so it completes even if the caller
    /// is dropped halfway through.
    pub async fn stop(&self, key: InstanceKey) -> StopReport {
        let stopper = Arc::clone(&self.stopper);
        match tokio::spawn(async move { stopper.stop(key).await }).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Stop task failed");
                StopReport::not_running(&key)
            }
        }
    }

    /// Stop every live instance, concurrently.
    pub async fn stop_all(&self) -> Vec<StopReport> {
        let keys = self.registry.all_keys();
        if !keys.is_empty() {
            tracing::info!(count = keys.len(), "Stopping all running jobs");
        }
        futures::future::join_all(keys.into_iter().map(|key| self.stop(key))).await
    }

    /// Live instances, oldest first.
    pub fn running(&self) -> Vec<InstanceSummary> {
        self.registry.summaries()
    }

    pub fn status(&self) -> JobStatus {
        let instances = self.registry.summaries();
        let latest = instances.last().map(|i| (i.job_type, i.pid));
        JobStatus {
            running: latest.is_some(),
            job_type: latest.map(|(job_type, _)| job_type),
            pid: latest.map(|(_, pid)| pid),
            instances,
        }
    }

    /// Kill automation browsers left behind by dead workers.
    pub async fn sweep_orphans(&self) -> ReapReport {
        self.reaper.sweep().await
    }

    /// Stop all jobs, then sweep for orphans.
    pub async fn shutdown(&self) -> (Vec<StopReport>, ReapReport) {
        let reports = self.stop_all().await;
        let reaped = self.sweep_orphans().await;
        tracing::info!(stopped = reports.len(), reaped = reaped.killed, "Job manager shut down");
        (reports, reaped)
    }
}
