pub mod routes;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Camera catalog and session control
        .route(
            "/v1/cameras",
            get(routes::list_cameras).post(routes::register_camera),
        )
        .route("/v1/cameras/:id/start", post(routes::start_camera))
        .route("/v1/cameras/:id/stop", post(routes::stop_camera))
        .route("/v1/cameras/:id/status", get(routes::camera_status))
        // Live preview
        .route("/v1/cameras/:id/stream", get(routes::stream_camera))
        .route("/v1/cameras/:id/snapshot", get(routes::camera_snapshot))
        // Alert history and node stats
        .route("/v1/alerts", get(routes::recent_alerts))
        .route("/v1/stats", get(routes::node_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
