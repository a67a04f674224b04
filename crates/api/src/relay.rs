//! Event-to-socket relay.
//!
//! [`EventRelay`] subscribes to the job event bus and forwards every
//! dispatch to the sockets in its audience. After an instance starts or
//! reaches a terminal event, every socket also gets a fresh
//! `job_status_update`.

use std::sync::Arc;

use fanfinder_events::{Audience, Dispatch, JobEvent};
use fanfinder_runner::JobManager;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ws::protocol;
use crate::ws::WsManager;

pub struct EventRelay {
    ws_manager: Arc<WsManager>,
    jobs: Arc<JobManager>,
}

impl EventRelay {
    pub fn new(ws_manager: Arc<WsManager>, jobs: Arc<JobManager>) -> Self {
        Self { ws_manager, jobs }
    }

    /// Run the relay loop until `cancel` fires or the bus closes.
    ///
    /// Dispatches already queued when `cancel` fires are still delivered.
    pub async fn run(self, mut receiver: broadcast::Receiver<Dispatch>, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                next = receiver.recv() => next,
                () = cancel.cancelled() => {
                    while let Ok(dispatch) = receiver.try_recv() {
                        self.relay(dispatch).await;
                    }
                    tracing::info!("Event relay stopped");
                    break;
                }
            };
            match next {
                Ok(dispatch) => self.relay(dispatch).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event relay shutting down");
                    break;
                }
            }
        }
    }

    async fn relay(&self, dispatch: Dispatch) {
        let Some(frame) = protocol::text_frame(&dispatch.event) else {
            return;
        };

        match &dispatch.audience {
            Audience::All => self.ws_manager.broadcast(frame).await,
            Audience::Observer(conn_id) => {
                if !self.ws_manager.send_to(conn_id, frame).await {
                    tracing::debug!(
                        conn_id = %conn_id,
                        event_type = dispatch.event.event_type(),
                        "Observer gone, dropping event"
                    );
                }
            }
        }

        if changes_status(&dispatch.event) {
            let status = protocol::status_update(&self.jobs.status());
            if let Some(frame) = protocol::text_frame(&status) {
                self.ws_manager.broadcast(frame).await;
            }
        }
    }
}

fn changes_status(event: &JobEvent) -> bool {
    matches!(event, JobEvent::JobStarted { .. }) || event.is_terminal()
}
