//! Pure domain logic for the job orchestration backend.
//!
//! Nothing in this crate touches processes, sockets, or the clock beyond
//! timestamp types. The runner and API crates build on these types:
//!
//! - [`job_type::JobType`] and [`instance::InstanceKey`] name running jobs.
//! - [`settings::JobSettings`] is the validated settings bag for a launch.
//! - [`progress::parse_progress`] extracts collection progress from worker output.
//! - [`browser::BrowserSignature`] recognises automation browser processes.

pub mod browser;
pub mod error;
pub mod instance;
pub mod job_events;
pub mod job_type;
pub mod progress;
pub mod settings;
pub mod types;
