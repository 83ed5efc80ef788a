//! /status: node identity and counters.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use murmur_core::CipherMode;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub peer_id: String,
    pub listen_addr: String,
    pub protocol: String,
    pub peers: usize,
    pub queued: usize,
    pub received: usize,
    pub cipher_mode: CipherMode,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        peer_id: state.local_peer_id.to_string(),
        listen_addr: state.listen_addr.clone(),
        protocol: state.protocol.clone(),
        peers: state.registry.len(),
        queued: state.queue.len().await,
        received: state.inbox.len().await,
        cipher_mode: state.cipher_mode,
    })
}
