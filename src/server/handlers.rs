//! HTTP handlers for the notification API.

use super::error::{ApiError, ApiResult};
use super::response::ApiResponse;
use super::AppState;
use crate::core::NotificationRequest;
use crate::report::{dispatch_response, probe_response, summarize, DispatchResponse, ProbeResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckRequest {
    pub device_token: String,
}

/// POST /notifications/dispatch
pub async fn dispatch(
    State(state): State<AppState>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<DispatchResponse>> {
    let Json(request) = payload?;
    let report = state.dispatcher.dispatch(request).await?;

    let summary = summarize(&report);
    info!(
        total = summary.total_tasks,
        fulfilled = summary.fulfilled_count,
        rejected = summary.rejected.len(),
        "Notifications processed"
    );

    Ok(ApiResponse::ok(dispatch_response(&report)))
}

/// POST /notifications/healthcheck -- sends a fixed test push to one device.
pub async fn healthcheck(
    State(state): State<AppState>,
    payload: Result<Json<HealthcheckRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<ProbeResponse>> {
    let Json(HealthcheckRequest { device_token }) = payload?;
    if device_token.trim().is_empty() {
        return Err(ApiError::BadRequest("deviceToken must not be empty".to_string()));
    }

    let entry = state.dispatcher.probe_push(&device_token).await?;
    Ok(ApiResponse::ok(probe_response(&entry)))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub channels: ChannelStatus,
}

/// Which delivery channels have a usable backend.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChannelStatus {
    pub email: bool,
    pub push: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResponse<HealthResponse> {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        channels: state.channels,
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
