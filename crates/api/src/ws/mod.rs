//! WebSocket transport for job events and commands.
//!
//! Provides connection management, the client message protocol, and the
//! HTTP upgrade handler used by Axum routes.

mod handler;
pub mod manager;
pub mod protocol;

pub use handler::ws_handler;
pub use manager::WsManager;
