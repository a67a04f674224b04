use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use fanfinder_core::types::{ObserverId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections, keyed by connection id.
///
/// The connection id doubles as the observer id jobs use to address
/// replies to the socket that started them.
pub struct WsManager {
    connections: RwLock<HashMap<ObserverId, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: ObserverId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Broadcast a message to all connected clients.
    ///
    /// Connections whose send channels are closed are silently skipped
    /// (they will be cleaned up on their next receive loop iteration).
    pub async fn broadcast(&self, message: Message) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(message.clone());
        }
    }

    /// Send a message to one connection. Returns whether it was queued.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Ping every client each `every` until the returned handle is aborted.
    pub fn spawn_heartbeat(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick fires immediately; sockets were just greeted.
            interval.tick().await;
            loop {
                interval.tick().await;
                let count = self.connection_count().await;
                if count == 0 {
                    continue;
                }
                tracing::debug!(count, "WebSocket heartbeat ping");
                self.ping_all().await;
            }
        })
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Message {
        Message::Text(s.into())
    }

    #[tokio::test]
    async fn send_to_reaches_only_the_target() {
        let manager = WsManager::new();
        let mut a = manager.add("a".into()).await;
        let mut b = manager.add("b".into()).await;

        assert!(manager.send_to("a", text("hello")).await);
        assert!(!manager.send_to("missing", text("hello")).await);

        assert_eq!(a.recv().await, Some(text("hello")));
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_and_shutdown() {
        let manager = WsManager::new();
        let mut a = manager.add("a".into()).await;
        manager.broadcast(text("all")).await;
        assert_eq!(a.recv().await, Some(text("all")));

        manager.shutdown_all().await;
        assert_eq!(a.recv().await, Some(Message::Close(None)));
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_connected_clients() {
        let manager = Arc::new(WsManager::new());
        let mut a = manager.add("a".into()).await;
        let heartbeat = Arc::clone(&manager).spawn_heartbeat(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(a.recv().await, Some(Message::Ping(Bytes::new())));
        heartbeat.abort();
    }
}
