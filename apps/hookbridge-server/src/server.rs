//! HTTP Server implementation

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use hookbridge_core::ServerConfig;
use hookbridge_webhook::create_webhook_router;

use crate::api::create_api_router;
use crate::app::AppState;

pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Result<Self> {
        Ok(Self { config, state })
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.address();
        let app = build_http_router(self.state);

        info!("HTTP server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

pub fn build_http_router(state: AppState) -> Router {
    let webhooks = create_webhook_router(state.webhooks.clone());
    let api = create_api_router(Arc::new(state));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api", api)
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// Route handlers

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "Hookbridge",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hookbridge_core::{AppConfig, ProviderConfig, ProvidersConfig, WebhookSettings};
    use tower::ServiceExt;

    async fn router() -> Router {
        let config = AppConfig {
            server: ServerConfig::new(),
            webhooks: WebhookSettings::new("https://hooks.example.com"),
            providers: ProvidersConfig {
                github: ProviderConfig::new("http://127.0.0.1:9"),
                bitbucket: ProviderConfig::new("http://127.0.0.1:9"),
            },
            credentials: Default::default(),
        };
        let (state, _runs) = AppState::new(&config).await.unwrap();
        build_http_router(state)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_handler() {
        let response = root().await;
        assert_eq!(response.0["service"], "Hookbridge");
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = router()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_unknown_provider() {
        let response = router()
            .await
            .oneshot(post_json(
                "/api/triggers",
                json!({
                    "trigger_id": "t1",
                    "provider": "gitlab",
                    "source": {"subresource": "project", "project": "acme/widgets"},
                    "access_info": {"connection_id": "conn-1"},
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("gitlab"));
    }

    #[tokio::test]
    async fn test_register_unsupported_subresource() {
        let response = router()
            .await
            .oneshot(post_json(
                "/api/triggers",
                json!({
                    "trigger_id": "t1",
                    "provider": "github",
                    "source": {"subresource": "enterprise", "enterprise": "acme", "events": ["push"]},
                    "access_info": {"connection_id": "conn-1"},
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_trigger_routes() {
        let app = router().await;

        let delete = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/triggers/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::NOT_FOUND);

        let display = app
            .oneshot(
                Request::builder()
                    .uri("/api/triggers/missing/display")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(display.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_route_is_mounted() {
        let response = router()
            .await
            .oneshot(post_json(
                "/webhooks/bitbucket/00000000000000000000000000000000",
                json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["routed"], 0);
    }
}
