//! HTTP API handlers: exposes node state as JSON.

pub mod messages;
pub mod peers;
pub mod send;
pub mod status;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use murmur_core::{CipherMode, PeerId};
use murmur_services::{Inbox, OutboundQueue, PeerRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub registry: PeerRegistry,
    pub queue: OutboundQueue,
    pub inbox: Inbox,
    pub local_peer_id: PeerId,
    /// Address the stream transport is listening on.
    pub listen_addr: String,
    pub protocol: String,
    pub cipher_mode: CipherMode,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: msg.into() }),
    )
}

// Re-export handler functions for use in router setup.
pub use messages::handle_messages;
pub use peers::handle_peers;
pub use send::handle_send;
pub use status::handle_status;

#[cfg(test)]
pub(crate) fn test_state() -> ApiState {
    ApiState {
        registry: PeerRegistry::new(),
        queue: OutboundQueue::new(),
        inbox: Inbox::new(8),
        local_peer_id: PeerId::from("local"),
        listen_addr: "127.0.0.1:7000".into(),
        protocol: murmur_core::wire::PROTOCOL_ID.into(),
        cipher_mode: CipherMode::StaticIv,
    }
}
