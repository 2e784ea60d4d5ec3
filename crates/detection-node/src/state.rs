use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use common::cameras::{
    CameraConfig, CameraStatus, CameraSummary, NodeStats, RegisterCameraRequest, SessionState,
};
use common::contracts::AlertStore;
use common::error::SessionError;

use crate::config::Config;
use crate::session::SessionRegistry;

/// Shared handle threaded through the HTTP layer. The camera catalog is the
/// source of truth for what exists; the registry tracks what is running.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    cameras: RwLock<HashMap<String, CameraConfig>>,
    registry: SessionRegistry,
    store: Arc<dyn AlertStore>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, registry: SessionRegistry, store: Arc<dyn AlertStore>) -> Self {
        let mut cameras = HashMap::new();
        for camera in &config.cameras {
            cameras.insert(camera.id.clone(), camera.clone());
        }
        Self {
            inner: Arc::new(AppStateInner {
                config,
                cameras: RwLock::new(cameras),
                registry,
                store,
                started_at: Utc::now(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn AlertStore> {
        &self.inner.store
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.inner.started_at).num_seconds()
    }

    pub async fn camera_count(&self) -> usize {
        self.inner.cameras.read().await.len()
    }

    pub async fn get_camera(&self, camera_id: &str) -> Option<CameraConfig> {
        self.inner.cameras.read().await.get(camera_id).cloned()
    }

    /// Adds a camera to the catalog without starting it. A missing id gets a
    /// generated one.
    pub async fn register_camera(
        &self,
        request: RegisterCameraRequest,
    ) -> Result<CameraConfig, SessionError> {
        let id = request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut cameras = self.inner.cameras.write().await;
        if cameras.contains_key(&id) {
            return Err(SessionError::AlreadyRegistered(id));
        }

        let config = CameraConfig {
            id: id.clone(),
            name: request.name,
            source: request.source,
        };
        cameras.insert(id, config.clone());
        Ok(config)
    }

    pub async fn list_cameras(&self) -> Vec<CameraSummary> {
        let cameras = self.inner.cameras.read().await;
        let mut summaries = Vec::with_capacity(cameras.len());
        for config in cameras.values() {
            let (state, last_error) = match self.inner.registry.get(&config.id).await {
                Some(session) => (session.state(), session.last_error().await),
                None => (SessionState::Stopped, None),
            };
            summaries.push(CameraSummary {
                config: config.clone(),
                state,
                last_error,
            });
        }
        summaries.sort_by(|a, b| a.config.id.cmp(&b.config.id));
        summaries
    }

    pub async fn start_camera(&self, camera_id: &str) -> Result<SessionState, SessionError> {
        let config = self
            .get_camera(camera_id)
            .await
            .ok_or_else(|| SessionError::UnknownCamera(camera_id.to_string()))?;
        let session = self.inner.registry.start(config).await?;
        Ok(session.state())
    }

    pub async fn stop_camera(&self, camera_id: &str) -> Result<SessionState, SessionError> {
        if self.get_camera(camera_id).await.is_none() {
            return Err(SessionError::UnknownCamera(camera_id.to_string()));
        }
        Ok(self.inner.registry.stop(camera_id).await)
    }

    /// Latest classification for a camera, or `None` for cameras that were
    /// never registered. Registered cameras without a result yet report the
    /// `unknown` placeholder.
    pub async fn camera_status(&self, camera_id: &str) -> Option<CameraStatus> {
        let config = self.get_camera(camera_id).await?;
        let session = self.inner.registry.get(&config.id).await;

        let state = match &session {
            Some(session) => session.state(),
            None => SessionState::Stopped,
        };
        let result = session.as_ref().and_then(|s| s.latest_result());

        Some(match result {
            Some(result) => CameraStatus {
                camera_id: config.id,
                label: result.label,
                confidence: result.confidence,
                observed_at: Some(result.observed_at),
                state,
            },
            None => CameraStatus {
                camera_id: config.id,
                label: "unknown".to_string(),
                confidence: 0.0,
                observed_at: None,
                state,
            },
        })
    }

    pub async fn stats(&self) -> NodeStats {
        let alerts_total = self.inner.store.count().await.unwrap_or_else(|err| {
            warn!(error = %err, "alert store count failed, reporting zero");
            0
        });
        NodeStats {
            node_id: self.inner.config.node_id.clone(),
            uptime_secs: self.uptime_secs(),
            cameras: self.camera_count().await,
            sessions_running: self.inner.registry.running_count().await,
            alerts_total,
        }
    }

    pub async fn shutdown(&self) {
        self.inner.registry.shutdown_all().await;
    }
}
