// ABOUTME: Optional HTTP status server with /health and Prometheus /metrics endpoints
// ABOUTME: Reports feed and gateway connection state plus the configured tenant count

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use pepito_core::config::StatusConfig;
use pepito_core::{ConnectionState, SharedRegistry};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct StatusState {
    pub registry: SharedRegistry,
    pub feed: watch::Receiver<ConnectionState>,
    pub gateway: watch::Receiver<ConnectionState>,
    pub metrics: Option<Arc<PrometheusHandle>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub feed: &'static str,
    pub gateway: &'static str,
    pub configured_tenants: usize,
}

pub fn status_router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serve until `shutdown` flips
pub async fn start_status_server(
    config: &StatusConfig,
    state: StatusState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind status server to {}", addr))?;
    tracing::info!(addr = %addr, "Starting status server");

    axum::serve(listener, status_router(state))
        .with_graceful_shutdown(async move {
            pepito_core::context::shutdown_requested(&mut shutdown).await;
        })
        .await
        .context("Status server failed")?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let feed = state.feed.borrow().clone();
    let gateway = state.gateway.borrow().clone();
    let configured_tenants = state.registry.lock().await.len();

    let healthy = feed.is_streaming() && gateway.is_streaming();
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        feed: feed.label(),
        gateway: gateway.label(),
        configured_tenants,
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

async fn metrics_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "Metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pepito_core::{Registry, RegistryEntry};
    use tower::ServiceExt;

    fn state(feed: ConnectionState, gateway: ConnectionState) -> (tempfile::TempDir, StatusState) {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::empty(dir.path().join("channels.json"));
        registry.set(RegistryEntry::new("1", "10"));
        let (_feed_tx, feed_rx) = watch::channel(feed);
        let (_gw_tx, gw_rx) = watch::channel(gateway);
        (
            dir,
            StatusState {
                registry: registry.into_shared(),
                feed: feed_rx,
                gateway: gw_rx,
                metrics: None,
            },
        )
    }

    async fn get_status(state: StatusState, uri: &str) -> (StatusCode, String) {
        let response = status_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let code = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (code, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_ok_when_both_streams_up() {
        let (_dir, state) = state(ConnectionState::Streaming, ConnectionState::Streaming);
        let (code, body) = get_status(state, "/health").await;
        assert_eq!(code, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["configured_tenants"], 1);
    }

    #[tokio::test]
    async fn test_health_degraded_while_feed_reconnects() {
        let (_dir, state) = state(ConnectionState::Connecting, ConnectionState::Streaming);
        let (code, body) = get_status(state, "/health").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("degraded"));
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (_dir, state) = state(ConnectionState::Streaming, ConnectionState::Streaming);
        let (code, _) = get_status(state, "/metrics").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
