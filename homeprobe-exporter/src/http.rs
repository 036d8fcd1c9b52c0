//! HTTP server for the metrics endpoint.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use homeprobe_metrics::SharedMetricSet;

use crate::config::RESERVED_PATHS;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    metrics: SharedMetricSet,
    ready_at: Instant,
}

/// Create the HTTP router.
fn create_router(metrics: SharedMetricSet, metrics_path: &str, ready_at: Instant) -> Router {
    let state = AppState { metrics, ready_at };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut body = Vec::new();

    match state.metrics.write(&mut body, Instant::now()) {
        Ok(()) => {
            debug!(bytes = body.len(), "Rendered metrics");
            (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics\n").into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    let now = Instant::now();

    if now >= state.ready_at {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        let left = state.ready_at.saturating_duration_since(now);
        info!(left_secs = left.as_secs(), "Warming up");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - sensors warming up\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    metrics: SharedMetricSet,
    listen_addr: SocketAddr,
    metrics_path: String,
    ready_at: Instant,
}

impl HttpServer {
    /// Create a new HTTP server, ready immediately.
    pub fn new(metrics: SharedMetricSet, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            metrics,
            listen_addr,
            metrics_path,
            ready_at: Instant::now(),
        }
    }

    /// Report not ready on /ready until `ready_at`.
    pub fn with_warmup_until(mut self, ready_at: Instant) -> Self {
        self.ready_at = ready_at;
        self
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        if RESERVED_PATHS.contains(&self.metrics_path.as_str()) {
            anyhow::bail!(
                "Metrics path {} collides with a built-in endpoint",
                self.metrics_path
            );
        }

        let addr = listener.local_addr()?;
        let router = create_router(self.metrics, &self.metrics_path, self.ready_at);

        info!(
            addr = %addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
