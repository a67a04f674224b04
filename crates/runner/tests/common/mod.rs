#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fanfinder_core::browser::BrowserSignature;
use fanfinder_core::instance::InstanceKey;
use fanfinder_core::job_type::JobType;
use fanfinder_core::settings::JobSettings;
use fanfinder_events::{Dispatch, EventBus, JobEvent};
use fanfinder_runner::{JobManager, RunnerConfig, StartRequest};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Upper bound on how long any test waits for a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A scratch script directory plus a manager that runs its scripts with bash.
pub struct Harness {
    pub dir: TempDir,
    pub manager: Arc<JobManager>,
    pub events: broadcast::Receiver<Dispatch>,
}

/// Write `body` as the worker script for `job_type`.
pub fn write_script(dir: &Path, job_type: JobType, body: &str) {
    std::fs::write(dir.join(job_type.script_file_name()), body).unwrap();
}

pub fn harness() -> Harness {
    harness_with(BrowserSignature::default(), Duration::from_secs(2))
}

pub fn harness_with(signature: BrowserSignature, stop_grace: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        interpreter: "bash".to_string(),
        script_dirs: vec![dir.path().to_path_buf()],
        stop_grace,
        signature,
        ..Default::default()
    };
    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();
    let manager = Arc::new(JobManager::new(config, bus));
    Harness {
        dir,
        manager,
        events,
    }
}

pub fn settings() -> JobSettings {
    JobSettings {
        model_id: "model-1".to_string(),
        target_users: 50,
        ..Default::default()
    }
}

pub fn request(job_type: JobType, instance_number: u32, observer: Option<&str>) -> StartRequest {
    StartRequest {
        job_type,
        instance_number,
        settings: settings(),
        observer: observer.map(str::to_string),
    }
}

pub fn key(job_type: JobType, instance_number: u32) -> InstanceKey {
    InstanceKey::new(job_type, instance_number).unwrap()
}

/// Next dispatch on the bus, failing the test after [`EVENT_TIMEOUT`].
pub async fn next_dispatch(events: &mut broadcast::Receiver<Dispatch>) -> Dispatch {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed")
}

/// Collect every dispatch for `key` up to and including its terminal event.
pub async fn until_terminal(
    events: &mut broadcast::Receiver<Dispatch>,
    key: InstanceKey,
) -> Vec<Dispatch> {
    let mut out = Vec::new();
    loop {
        let dispatch = next_dispatch(events).await;
        if dispatch.event.instance() != Some(key) {
            continue;
        }
        let terminal = dispatch.event.is_terminal();
        out.push(dispatch);
        if terminal {
            return out;
        }
    }
}

/// Wait for an output line for `key` containing `needle`.
pub async fn wait_for_output(
    events: &mut broadcast::Receiver<Dispatch>,
    key: InstanceKey,
    needle: &str,
) {
    loop {
        let dispatch = next_dispatch(events).await;
        if let JobEvent::JobOutput { line, .. } = &dispatch.event {
            if dispatch.event.instance() == Some(key) && line.contains(needle) {
                return;
            }
        }
    }
}

pub fn types_of(dispatches: &[Dispatch]) -> Vec<&'static str> {
    dispatches.iter().map(|d| d.event.event_type()).collect()
}

pub fn count_of(dispatches: &[Dispatch], event_type: &str) -> usize {
    dispatches
        .iter()
        .filter(|d| d.event.event_type() == event_type)
        .count()
}
