//! /messages: recently received messages.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use murmur_services::unix_secs;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageJson>,
}

#[derive(Debug, Serialize)]
pub struct MessageJson {
    pub from: String,
    pub text: String,
    pub received_at: f64,
}

pub async fn handle_messages(State(state): State<ApiState>) -> Json<MessagesResponse> {
    let messages = state
        .inbox
        .list()
        .await
        .into_iter()
        .map(|m| MessageJson {
            from: m.from.to_string(),
            text: m.text,
            received_at: unix_secs(m.received_at),
        })
        .collect();

    Json(MessagesResponse { messages })
}
