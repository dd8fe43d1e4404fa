//! HTTP server for the registry protocol
//!
//! Maps discovery, module, provider and analytics routes onto the engines
//! held in [`AppState`]. [`error::ApiError`] is the only place registry
//! errors become HTTP statuses.

pub mod error;
pub mod path;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::OriginalUri;
use axum::http::StatusCode;
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::RegistryConfig;
pub use crate::server::error::{ApiError, ApiResult};
pub use crate::server::state::AppState;

/// Build the protocol router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    let server_config = &state.config.server;
    let request_timeout = server_config.request_timeout();
    let concurrency_limit = server_config.concurrency_limit.max(1);

    Router::new()
        .merge(routes::routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

async fn not_found(uri: OriginalUri) -> ApiError {
    ApiError::not_found(format!("Not found: {}", uri.0.path()))
}

async fn handle_timeout_error(err: tower::BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::unavailable("Request timed out")
    } else {
        ApiError::internal(format!("Unhandled middleware error: {}", err))
    }
}

/// Serve the registry until the process is stopped
pub async fn run_server(config: RegistryConfig) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let (state, writer) = AppState::open(config)?;
    let state = Arc::new(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Module registry listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, flushing analytics");
    state.analytics.flush().await;
    drop(state);
    writer.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::SqliteAnalyticsStore;
    use crate::blob::UrlBlobStore;
    use crate::catalog::SqliteCatalog;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn create_state(temp_dir: &TempDir) -> Arc<AppState> {
        let catalog = SqliteCatalog::new(&temp_dir.path().join("registry.db")).unwrap();
        let analytics = SqliteAnalyticsStore::new(&temp_dir.path().join("analytics.db")).unwrap();
        let (state, _writer) = AppState::new(
            RegistryConfig::default(),
            Arc::new(catalog),
            Arc::new(analytics),
            Arc::new(UrlBlobStore::new("https://blobs.example.com")),
        );
        Arc::new(state)
    }

    #[tokio::test]
    async fn unknown_path_returns_not_found_error_body() {
        let temp_dir = TempDir::new().unwrap();
        let app = router(create_state(&temp_dir));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/this/path/does/not/exist")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["errors"][0].as_str().unwrap().contains("/this/path"));
    }

    #[tokio::test]
    async fn discovery_uses_configured_base_path() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = SqliteCatalog::new(&temp_dir.path().join("registry.db")).unwrap();
        let analytics = SqliteAnalyticsStore::new(&temp_dir.path().join("analytics.db")).unwrap();
        let mut config = RegistryConfig::default();
        config.server.base_path = "https://registry.example.com/".to_string();
        let (state, _writer) = AppState::new(
            config,
            Arc::new(catalog),
            Arc::new(analytics),
            Arc::new(UrlBlobStore::new("")),
        );

        let response = router(Arc::new(state))
            .oneshot(
                Request::builder()
                    .uri("/.well-known/terraform.json")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "modules.v1": "https://registry.example.com/v1/modules/",
                "providers.v1": "https://registry.example.com/v1/providers/"
            })
        );
    }
}
