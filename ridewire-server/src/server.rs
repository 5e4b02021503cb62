//! Axum server setup and router configuration.

use crate::api::ws::dispatch_ws;
use crate::state::AppState;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use ridewire_core::framework::DispatchStats;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/ws", get(dispatch_ws))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Live counters of the dispatch core.
async fn stats(State(state): State<AppState>) -> Json<DispatchStats> {
    Json(state.dispatcher.stats())
}

/// Bind `addr` and serve until `shutdown` completes.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, router, shutdown).await
}

/// Serve on an already bound listener with graceful shutdown.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::runtime::ServerConfig;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use ridewire_core::framework::Dispatcher;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn app() -> Router {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState::new(
            Arc::new(Dispatcher::default()),
            ServerConfig {
                listen: "127.0.0.1:0".parse().unwrap(),
            },
            shutdown_rx,
        );
        build_router(state)
    }

    async fn get_json(path: &str) -> serde_json::Value {
        let response = app()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let body = get_json("/health").await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_stats_start_empty() {
        let body = get_json("/stats").await;
        assert_eq!(body["connectedDrivers"], 0);
        assert_eq!(body["activeRides"], 0);
        assert_eq!(body["activeSearches"], 0);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let response = app()
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
