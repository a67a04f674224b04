use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use fanfinder_core::instance::InstanceKey;
use fanfinder_runner::{JobManager, StartRequest};
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;
use crate::ws::protocol::{self, ClientMessage};

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, state.jobs))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager` and greets it.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes inbound commands on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, jobs: Arc<JobManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone()).await;
    reply(&ws_manager, &conn_id, &protocol::connection_confirmed(&conn_id)).await;
    reply(&ws_manager, &conn_id, &protocol::status_update(&jobs.status())).await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_command(&ws_manager, &jobs, &conn_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

async fn handle_command(ws_manager: &WsManager, jobs: &Arc<JobManager>, conn_id: &str, text: &str) {
    let command = match ClientMessage::parse(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Unrecognised WebSocket message");
            reply(ws_manager, conn_id, &protocol::protocol_error(e)).await;
            return;
        }
    };

    match command {
        ClientMessage::Ping => reply(ws_manager, conn_id, &protocol::pong()).await,

        ClientMessage::StartJob {
            job_type,
            instance_number,
            settings,
        } => {
            tracing::info!(conn_id = %conn_id, job_type = %job_type, instance_number, "Start requested over WebSocket");
            // Failures were already published to this connection as job_error.
            let _ = jobs.start(StartRequest {
                job_type,
                instance_number,
                settings,
                observer: Some(conn_id.to_string()),
            });
        }

        ClientMessage::StopJob {
            job_type,
            instance_number,
        } => match InstanceKey::new(job_type, instance_number) {
            Ok(key) => {
                // Stopping can take the whole grace period; keep reading meanwhile.
                let jobs = Arc::clone(jobs);
                tokio::spawn(async move {
                    jobs.stop(key).await;
                });
            }
            Err(e) => reply(ws_manager, conn_id, &protocol::protocol_error(e)).await,
        },
    }
}

async fn reply(ws_manager: &WsManager, conn_id: &str, value: &serde_json::Value) {
    if let Some(frame) = protocol::text_frame(value) {
        ws_manager.send_to(conn_id, frame).await;
    }
}
