//! API Routes
//!
//! Configures the Axum router with all cache node endpoints.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{
    fetch_empty_key_handler, fetch_handler, health_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /_cache/:group/:key` - Value bytes for a key, loading it if needed
/// - `GET /stats/:group` - Group statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/_cache/:group/:key", get(fetch_handler))
        .route("/_cache/:group/", get(fetch_empty_key_handler))
        .route("/stats/:group", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::util::ServiceExt;

    use crate::group::{GroupOptions, GroupRegistry, LoaderFn};

    fn create_test_app() -> Router {
        let registry = Arc::new(GroupRegistry::new());
        registry
            .new_group(
                "scores",
                Arc::new(LoaderFn(|key: String| async move {
                    match key.as_str() {
                        "Tom" => Ok(b"630".to_vec()),
                        "a b/c" => Ok(b"escaped".to_vec()),
                        _ => Err(anyhow::anyhow!("{} not exist", key)),
                    }
                })),
                GroupOptions::default(),
            )
            .unwrap();
        create_router(AppState::new(registry, "127.0.0.1:8001"))
    }

    async fn send(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = send(create_test_app(), "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_fetch_endpoint() {
        let response = send(create_test_app(), "/_cache/scores/Tom").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(body_bytes(response).await, b"630");
    }

    #[tokio::test]
    async fn test_fetch_decodes_escaped_key() {
        let response = send(create_test_app(), "/_cache/scores/a%20b%2Fc").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"escaped");
    }

    #[tokio::test]
    async fn test_fetch_unknown_group() {
        let response = send(create_test_app(), "/_cache/users/Tom").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_empty_key() {
        let response = send(create_test_app(), "/_cache/scores/").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fetch_loader_error() {
        let response = send(create_test_app(), "/_cache/scores/Nobody").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "Nobody not exist");
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = create_test_app();
        send(app.clone(), "/_cache/scores/Tom").await;

        let response = send(app, "/stats/scores").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["group"], "scores");
        assert_eq!(body["local_loads"], 1);
    }

    #[tokio::test]
    async fn test_stats_unknown_group() {
        let response = send(create_test_app(), "/stats/users").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
