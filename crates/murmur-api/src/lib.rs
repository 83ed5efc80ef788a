pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// `/peers` and `/send` are served at the root as well as under `/api`,
/// for clients that talk to the bare paths.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers))
        .route("/send", post(handlers::handle_send))
        .route("/messages", get(handlers::handle_messages));

    Router::new()
        .route("/peers", get(handlers::handle_peers))
        .route("/send", post(handlers::handle_send))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
}

pub async fn serve(
    state: ApiState,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::handlers::test_state;

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_send(path: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::builder().method(Method::POST).uri(path);
        if let Some(ct) = content_type {
            req = req.header(header::CONTENT_TYPE, ct);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn peers_served_at_root_and_under_api() {
        let state = test_state();
        state.registry.upsert(&"p1".into());
        let app = router(state);

        for path in ["/peers", "/api/peers"] {
            let req = Request::get(path).body(Body::empty()).unwrap();
            let (status, body) = call(app.clone(), req).await;
            assert_eq!(status, StatusCode::OK, "{path}");
            assert_eq!(body["peers"][0]["id"], "p1", "{path}");
        }
    }

    #[tokio::test]
    async fn send_queues_at_root_and_under_api() {
        let state = test_state();
        let app = router(state.clone());

        for path in ["/send", "/api/send"] {
            let req = post_send(path, Some("application/json"), r#"{"content":"hi"}"#);
            let (status, body) = call(app.clone(), req).await;
            assert_eq!(status, StatusCode::OK, "{path}");
            assert_eq!(body["status"], "Message queued for broadcast");
        }
        assert_eq!(state.queue.len().await, 2);
    }

    #[tokio::test]
    async fn unreadable_send_bodies_are_content_required() {
        let state = test_state();
        let app = router(state.clone());

        let cases = [
            (None, ""),
            (None, r#"{"content":"hi"}"#),
            (Some("application/json"), ""),
            (Some("application/json"), "not json"),
            (Some("application/json"), r#"{"text":"wrong field"}"#),
            (Some("application/json"), r#"{"content":""}"#),
        ];
        for (content_type, body) in cases {
            let (status, json) = call(app.clone(), post_send("/send", content_type, body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{content_type:?} {body:?}");
            assert_eq!(json["error"], "Content is required");
        }
        assert!(state.queue.is_empty().await);
    }

    #[tokio::test]
    async fn status_and_messages_stay_under_api() {
        let app = router(test_state());

        let req = Request::get("/api/status").body(Body::empty()).unwrap();
        let (status, body) = call(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["peer_id"], "local");

        let resp = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
