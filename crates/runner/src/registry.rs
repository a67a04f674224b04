//! The set of live job instances.
//!
//! Every mutation goes through one `std::sync::Mutex`; the lock is never
//! held across an `.await`. A key is claimed with [`InstanceRegistry::reserve`]
//! before the process is spawned, so two concurrent starts of the same key
//! cannot both launch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use fanfinder_core::instance::InstanceKey;
use fanfinder_core::job_type::JobType;
use fanfinder_core::types::{ObserverId, Timestamp};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::reader::SupervisorExit;
use crate::stop::StopReport;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A launched job and the handles needed to stop it.
#[derive(Debug)]
pub struct RunningInstance {
    pub key: InstanceKey,
    pub pid: u32,
    pub started_at: Timestamp,
    pub target_users: u32,
    pub observer: Option<ObserverId>,
    collected: Arc<AtomicU32>,
    cancel: CancellationToken,
    task: Option<JoinHandle<SupervisorExit>>,
    /// Set once a stop claims the entry; resolves with that stop's report.
    stopped: Option<watch::Receiver<Option<StopReport>>>,
}

impl RunningInstance {
    pub(crate) fn new(
        key: InstanceKey,
        pid: u32,
        target_users: u32,
        observer: Option<ObserverId>,
        collected: Arc<AtomicU32>,
        cancel: CancellationToken,
        task: JoinHandle<SupervisorExit>,
    ) -> Self {
        Self {
            key,
            pid,
            started_at: Utc::now(),
            target_users,
            observer,
            collected,
            cancel,
            task: Some(task),
            stopped: None,
        }
    }

    /// Users collected so far, as last reported by the worker.
    pub fn collected(&self) -> u32 {
        self.collected.load(Ordering::Relaxed)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopped.is_some()
    }

    fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            key: self.key.to_string(),
            job_type: self.key.job_type,
            instance_number: self.key.instance_number,
            pid: self.pid,
            started_at: self.started_at,
            collected: self.collected(),
            target_users: self.target_users,
            stopping: self.is_stopping(),
        }
    }
}

/// Read-only view of a live instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub key: String,
    pub job_type: JobType,
    pub instance_number: u32,
    pub pid: u32,
    pub started_at: Timestamp,
    pub collected: u32,
    pub target_users: u32,
    pub stopping: bool,
}

/// What the stop controller takes out of an entry when it claims it.
#[derive(Debug)]
pub(crate) struct StopTicket {
    pub pid: u32,
    pub cancel: CancellationToken,
    pub task: Option<JoinHandle<SupervisorExit>>,
    /// Completes the stop for anyone waiting on [`StopClaim::InProgress`].
    pub done: watch::Sender<Option<StopReport>>,
}

/// Result of trying to claim an instance for stopping.
#[derive(Debug)]
pub(crate) enum StopClaim {
    /// This caller owns the stop.
    Claimed(StopTicket),
    /// Another stop owns it; the receiver yields its report when done.
    InProgress(watch::Receiver<Option<StopReport>>),
    /// Not live.
    Absent,
}

#[derive(Debug)]
enum Slot {
    /// Claimed by a start in progress; no process yet.
    Reserved,
    Live(RunningInstance),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    slots: Mutex<HashMap<InstanceKey, Slot>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` for a start in progress.
    ///
    /// Fails if the key is live or already claimed. The claim is released
    /// when the returned guard is dropped without being committed.
    pub fn reserve(&self, key: InstanceKey) -> Result<Reservation<'_>, JobError> {
        let mut slots = self.lock();
        if slots.contains_key(&key) {
            return Err(JobError::DuplicateInstance(key));
        }
        slots.insert(key, Slot::Reserved);
        Ok(Reservation {
            registry: self,
            key,
            committed: false,
        })
    }

    /// Insert a live instance directly. Fails if the key is taken.
    pub fn register(&self, instance: RunningInstance) -> Result<(), JobError> {
        let mut slots = self.lock();
        if slots.contains_key(&instance.key) {
            return Err(JobError::DuplicateInstance(instance.key));
        }
        slots.insert(instance.key, Slot::Live(instance));
        Ok(())
    }

    pub fn lookup(&self, key: &InstanceKey) -> Option<InstanceSummary> {
        match self.lock().get(key) {
            Some(Slot::Live(instance)) => Some(instance.summary()),
            _ => None,
        }
    }

    /// Remove a live instance. Absent keys are a no-op.
    pub fn remove(&self, key: &InstanceKey) -> Option<RunningInstance> {
        let mut slots = self.lock();
        match slots.get(key) {
            Some(Slot::Live(_)) => match slots.remove(key) {
                Some(Slot::Live(instance)) => Some(instance),
                _ => None,
            },
            _ => None,
        }
    }

    /// Keys of all live instances, sorted.
    pub fn all_keys(&self) -> Vec<InstanceKey> {
        let mut keys: Vec<InstanceKey> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(key, _)| *key)
            .collect();
        keys.sort_by_key(|k| (k.job_type.as_str(), k.instance_number));
        keys
    }

    /// Live keys of one job type.
    pub fn keys_of_type(&self, job_type: JobType) -> Vec<InstanceKey> {
        self.all_keys()
            .into_iter()
            .filter(|k| k.job_type == job_type)
            .collect()
    }

    /// Whether any instance of `job_type` is live.
    pub fn is_running(&self, job_type: JobType) -> bool {
        self.lock()
            .iter()
            .any(|(key, slot)| key.job_type == job_type && matches!(slot, Slot::Live(_)))
    }

    /// Summaries of all live instances, oldest first.
    pub fn summaries(&self) -> Vec<InstanceSummary> {
        let mut out: Vec<InstanceSummary> = self
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(instance) => Some(instance.summary()),
                Slot::Reserved => None,
            })
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.key.cmp(&b.key)));
        out
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark `key` as stopping and hand its control handles to the caller.
    ///
    /// Only the first caller gets [`StopClaim::Claimed`]; later ones get a
    /// receiver for the first stop's report. The entry stays in the map
    /// until the stopper calls [`remove`].
    ///
    /// [`remove`]: Self::remove
    pub(crate) fn begin_stop(&self, key: &InstanceKey) -> StopClaim {
        let mut slots = self.lock();
        let Some(Slot::Live(instance)) = slots.get_mut(key) else {
            return StopClaim::Absent;
        };
        if let Some(stopped) = &instance.stopped {
            return StopClaim::InProgress(stopped.clone());
        }
        let (done, stopped) = watch::channel(None);
        instance.stopped = Some(stopped);
        StopClaim::Claimed(StopTicket {
            pid: instance.pid,
            cancel: instance.cancel.clone(),
            task: instance.task.take(),
            done,
        })
    }

    /// Remove `key` after a natural exit.
    ///
    /// Returns `None` if the key is gone or a stop claimed it first; the
    /// caller then must not emit a terminal event.
    pub(crate) fn finish(&self, key: &InstanceKey) -> Option<RunningInstance> {
        let mut slots = self.lock();
        match slots.get(key) {
            Some(Slot::Live(instance)) if !instance.is_stopping() => match slots.remove(key) {
                Some(Slot::Live(instance)) => Some(instance),
                _ => None,
            },
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// A claimed key with no process attached yet.
#[derive(Debug)]
pub struct Reservation<'a> {
    registry: &'a InstanceRegistry,
    key: InstanceKey,
    committed: bool,
}

impl Reservation<'_> {
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// Replace the claim with the launched instance.
    pub fn commit(mut self, instance: RunningInstance) {
        debug_assert_eq!(instance.key, self.key);
        self.registry
            .lock()
            .insert(self.key, Slot::Live(instance));
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.registry.lock();
        if matches!(slots.get(&self.key), Some(Slot::Reserved)) {
            slots.remove(&self.key);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
