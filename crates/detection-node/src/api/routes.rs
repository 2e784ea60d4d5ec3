use crate::state::AppState;
use crate::stream::{self, MJPEG_CONTENT_TYPE};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::cameras::RegisterCameraRequest;
use common::error::SessionError;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_ALERT_LIMIT: u32 = 20;
const MAX_ALERT_LIMIT: u32 = 200;

fn session_error_response(err: SessionError) -> Response {
    let status = match &err {
        SessionError::UnknownCamera(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadyRegistered(_) => StatusCode::CONFLICT,
        SessionError::Policy(_) => StatusCode::BAD_REQUEST,
        SessionError::Source(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "detection-node"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    // the alert store is the only dependency that can go away at runtime
    match state.store().count().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "error": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// List all cameras in the catalog with their session state
pub async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let cameras = state.list_cameras().await;
    (StatusCode::OK, Json(json!({ "cameras": cameras })))
}

/// Add a camera to the catalog
pub async fn register_camera(
    State(state): State<AppState>,
    Json(request): Json<RegisterCameraRequest>,
) -> impl IntoResponse {
    match state.register_camera(request).await {
        Ok(config) => (StatusCode::CREATED, Json(config)).into_response(),
        Err(e) => session_error_response(e),
    }
}

/// Start the capture and inference session for a camera
pub async fn start_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.start_camera(&camera_id).await {
        Ok(session_state) => (
            StatusCode::OK,
            Json(json!({
                "camera_id": camera_id,
                "state": session_state
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to start camera {}: {}", camera_id, e);
            session_error_response(e)
        }
    }
}

/// Stop the session for a camera
pub async fn stop_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.stop_camera(&camera_id).await {
        Ok(session_state) => (
            StatusCode::OK,
            Json(json!({
                "camera_id": camera_id,
                "state": session_state
            })),
        )
            .into_response(),
        Err(e) => session_error_response(e),
    }
}

/// Latest classification for a camera
pub async fn camera_status(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.camera_status(&camera_id).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("Camera '{}' not found", camera_id)
            })),
        )
            .into_response(),
    }
}

/// MJPEG live preview for a camera
pub async fn stream_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Response {
    let Some(session) = state.registry().get(&camera_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("No active session for camera '{}'", camera_id)
            })),
        )
            .into_response();
    };

    let body = stream::mjpeg_body(session, state.config().stream.clone());
    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Failed to build stream response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Single latest frame for a camera as a plain JPEG
pub async fn camera_snapshot(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Response {
    let Some(session) = state.registry().get(&camera_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("No active session for camera '{}'", camera_id)
            })),
        )
            .into_response();
    };

    match session.latest_frame() {
        Some(frame) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/jpeg")],
            frame.data.clone(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "no frame available yet"
            })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    limit: Option<u32>,
}

/// Recent alert events, newest first
pub async fn recent_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ALERT_LIMIT)
        .min(MAX_ALERT_LIMIT);
    match state.store().recent(limit).await {
        Ok(alerts) => (StatusCode::OK, Json(json!({ "alerts": alerts }))).into_response(),
        Err(e) => {
            tracing::error!("Failed to load alerts: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Node-level counters for dashboards
pub async fn node_stats(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.stats().await))
}
