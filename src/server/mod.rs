//! The HTTP API.
//!
//! Routes:
//! - `POST /notifications/dispatch`
//! - `POST /notifications/healthcheck`
//! - `GET /health`
//! - `GET /metrics` (only when a Prometheus handle is installed)

pub mod error;
pub mod handlers;
pub mod response;

use crate::dispatch::Dispatcher;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use error::ApiError;
pub use handlers::ChannelStatus;
use metrics_exporter_prometheus::PrometheusHandle;
use std::any::Any;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub channels: ChannelStatus,
    pub metrics: Option<PrometheusHandle>,
}

/// Builds the API router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/notifications/dispatch", post(handlers::dispatch))
        .route("/notifications/healthcheck", post(handlers::healthcheck))
        .route("/health", get(handlers::health));

    if state.metrics.is_some() {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    ApiError::Internal(detail).into_response()
}

/// Serves `router` on `listener` until `shutdown_rx` fires.
pub async fn serve(listener: TcpListener, router: Router, mut shutdown_rx: watch::Receiver<bool>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP API listening");
    }
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_rx.changed().await.ok();
            info!("HTTP API received shutdown signal.");
        })
        .await;
    if let Err(e) = result {
        error!("HTTP API error: {}", e);
    }
}
