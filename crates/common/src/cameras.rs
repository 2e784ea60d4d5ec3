//! Camera catalog entries and session lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a camera's video comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VideoSource {
    /// Anything ffmpeg can open: RTSP, HTTP, or a local file path.
    Uri { uri: String },
    /// Synthetic color-cycle frames, used for development and tests.
    TestPattern,
}

/// A registered camera. Registration alone does not start capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    pub source: VideoSource,
}

/// Lifecycle state of one camera's processing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Request body for registering a camera. When `id` is omitted one is
/// generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCameraRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub source: VideoSource,
}

/// Catalog entry joined with its current session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSummary {
    pub config: CameraConfig,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Latest classification for a camera, served by the status endpoint.
///
/// Before the first classifier response arrives the label is `"unknown"`
/// with zero confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub camera_id: String,
    pub label: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
    pub state: SessionState,
}

/// Node-level counters served by the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub node_id: String,
    pub uptime_secs: i64,
    pub cameras: usize,
    pub sessions_running: usize,
    pub alerts_total: u64,
}
