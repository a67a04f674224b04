//! Messages exchanged over the job WebSocket.
//!
//! Job events are forwarded as their own JSON (see `fanfinder_events`);
//! this module covers the connection-level messages and client commands.

use axum::extract::ws::Message;
use fanfinder_core::job_events::{
    MSG_TYPE_CONNECTION_CONFIRMED, MSG_TYPE_ERROR, MSG_TYPE_JOB_STATUS_UPDATE, MSG_TYPE_PONG,
};
use fanfinder_core::job_type::JobType;
use fanfinder_core::settings::JobSettings;
use fanfinder_runner::JobStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;

fn default_instance_number() -> u32 {
    1
}

/// A command sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartJob {
        job_type: JobType,
        #[serde(default = "default_instance_number")]
        instance_number: u32,
        #[serde(default)]
        settings: JobSettings,
    },
    StopJob {
        job_type: JobType,
        #[serde(default = "default_instance_number")]
        instance_number: u32,
    },
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Serialize a value into a text frame.
pub fn text_frame<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            None
        }
    }
}

pub fn connection_confirmed(connection_id: &str) -> serde_json::Value {
    json!({
        "type": MSG_TYPE_CONNECTION_CONFIRMED,
        "connection_id": connection_id,
    })
}

pub fn status_update(status: &JobStatus) -> serde_json::Value {
    json!({
        "type": MSG_TYPE_JOB_STATUS_UPDATE,
        "running": status.running,
        "job_type": status.job_type,
        "pid": status.pid,
        "instances": status.instances,
    })
}

pub fn pong() -> serde_json::Value {
    json!({ "type": MSG_TYPE_PONG })
}

pub fn protocol_error(message: impl std::fmt::Display) -> serde_json::Value {
    json!({
        "type": MSG_TYPE_ERROR,
        "error": message.to_string(),
    })
}
