//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`JobEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the application: the
//! runner publishes, the API's relay task subscribes and forwards to sockets.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::event::{Audience, JobEvent};

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// A published event together with its intended audience.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatch {
    pub audience: Audience,
    pub event: JobEvent,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`Dispatch`]. Events from a single
/// publisher are received in the order they were published.
///
/// # Usage
///
/// ```rust
/// use fanfinder_core::instance::InstanceKey;
/// use fanfinder_core::job_type::JobType;
/// use fanfinder_events::{EventBus, JobEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// let key = InstanceKey::new(JobType::Discovery, 1).unwrap();
/// bus.broadcast(JobEvent::stopped(&key));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<Dispatch>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to the given audience.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, audience: Audience, event: JobEvent) {
        tracing::trace!(event_type = event.event_type(), ?audience, "Publishing job event");
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(Dispatch { audience, event });
    }

    /// Publish an event to every observer.
    pub fn broadcast(&self, event: JobEvent) {
        self.publish(Audience::All, event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Dispatch> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
