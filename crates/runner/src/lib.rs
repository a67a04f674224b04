//! Job orchestration: launching worker processes, tracking them, streaming
//! their output as events, and tearing them down.
//!
//! The pieces, leaves first:
//!
//! - [`registry::InstanceRegistry`]: which instance keys are live. The only
//!   shared mutable state in this crate.
//! - [`launcher::Launcher`]: locates a worker script and spawns it.
//! - [`reader`]: the per-instance supervisor task that reads output lines,
//!   publishes events and finalizes the instance when the process exits.
//! - [`process_table`]: process table snapshots filtered by
//!   [`BrowserSignature`](fanfinder_core::browser::BrowserSignature).
//! - [`stop::StopController`]: graceful-then-forced termination plus
//!   cleanup of the browser processes a job spawned.
//! - [`reaper::OrphanReaper`]: startup/shutdown sweep of leftover
//!   automation browsers.
//! - [`manager::JobManager`]: the facade the API talks to.

pub mod config;
pub mod error;
pub mod launcher;
pub mod manager;
pub mod process_table;
pub mod reader;
pub mod reaper;
pub mod registry;
pub mod stop;

pub use config::{ReaperConfig, RunnerConfig};
pub use error::JobError;
pub use manager::{JobManager, JobStatus, StartRequest, StartedJob};
pub use reaper::ReapReport;
pub use registry::InstanceSummary;
pub use stop::{StopReport, Termination};
