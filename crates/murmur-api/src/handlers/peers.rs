//! /peers: the current peer registry.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Serialize)]
pub struct PeerInfo {
    pub id: String,
    /// Unix seconds, fractional.
    pub last_seen: f64,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let mut peers: Vec<PeerInfo> = state
        .registry
        .snapshot()
        .into_iter()
        .map(|record| PeerInfo {
            last_seen: record.last_seen_secs(),
            id: record.peer_id.to_string(),
        })
        .collect();
    peers.sort_by(|a, b| a.id.cmp(&b.id));

    Json(PeersResponse { peers })
}
