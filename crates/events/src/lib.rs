//! Job event broadcasting.
//!
//! - [`JobEvent`]: the typed events a running job produces.
//! - [`Audience`]: who should receive an event (everyone, or one observer).
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. Publishing never blocks the job.

pub mod bus;
pub mod event;

pub use bus::{Dispatch, EventBus};
pub use event::{Audience, JobEvent};
