//! /send: queue content for broadcast to every peer.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use murmur_services::EnqueueError;

use super::{bad_request, ApiError, ApiState};

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub status: String,
}

/// A body that is missing, not JSON, or has no `content` is rejected the
/// same way as empty content.
pub async fn handle_send(
    State(state): State<ApiState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let content = match body {
        Ok(Json(req)) => req.content.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable /send body");
            String::new()
        }
    };

    match state.queue.enqueue(content).await {
        Ok(queued) => {
            tracing::debug!(queued, "message queued for broadcast");
            Ok(Json(SendResponse {
                status: "Message queued for broadcast".to_string(),
            }))
        }
        Err(e @ EnqueueError::ContentRequired) => Err(bad_request(e.to_string())),
    }
}
