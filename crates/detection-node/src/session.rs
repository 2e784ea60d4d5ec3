//! Camera session lifecycle.
//!
//! A session owns the capture loop and the inference loop for one camera.
//! The registry serializes start and stop behind one lock so concurrent
//! control calls cannot double-start a camera or leak a decoder process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::alerts::AlertPolicy;
use common::cameras::{CameraConfig, SessionState};
use common::contracts::ClassifierClient;
use common::error::SessionError;
use common::frames::{ClassificationResult, Frame};
use telemetry::metrics::{ACTIVE_SESSIONS, FRAMES_CAPTURED, FRAMES_DROPPED};

use crate::alert::{AlertEvaluator, AlertWork};
use crate::capture::{self, CaptureSettings, FrameSource};
use crate::config::Config;
use crate::pipeline::{FrameQueue, InferenceWorker, ResultBroadcaster};

pub struct CameraSession {
    camera: CameraConfig,
    state: Arc<watch::Sender<SessionState>>,
    frames: Arc<watch::Sender<Option<Arc<Frame>>>>,
    results: Arc<ResultBroadcaster>,
    cancel: CancellationToken,
    last_error: Arc<RwLock<Option<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CameraSession {
    fn launch(camera: CameraConfig, deps: &SessionDeps) -> Result<Arc<Self>, SessionError> {
        let source = capture::open_source(&camera, &deps.capture)?;

        let state = Arc::new(watch::channel(SessionState::Starting).0);
        let frames: Arc<watch::Sender<Option<Arc<Frame>>>> =
            Arc::new(watch::channel(None).0);
        let results = Arc::new(ResultBroadcaster::new());
        let queue = Arc::new(FrameQueue::new());
        let cancel = CancellationToken::new();
        let last_error = Arc::new(RwLock::new(None));

        let capture_task = tokio::spawn(capture_loop(
            source,
            camera.id.clone(),
            queue.clone(),
            frames.clone(),
            state.clone(),
            last_error.clone(),
            cancel.clone(),
        ));

        let worker = InferenceWorker {
            camera_id: camera.id.clone(),
            queue,
            classifier: deps.classifier.clone(),
            results: results.clone(),
            evaluator: AlertEvaluator::new(deps.policy.clone()),
            alert_tx: deps.alert_tx.clone(),
            classify_timeout: deps.classify_timeout,
            inference_interval: deps.inference_interval,
            cancel: cancel.clone(),
        };
        let worker_task = tokio::spawn(worker.run());

        state.send_replace(SessionState::Running);
        info!(camera_id = %camera.id, "camera session started");

        Ok(Arc::new(Self {
            camera,
            state,
            frames,
            results,
            cancel,
            last_error,
            tasks: Mutex::new(vec![capture_task, worker_task]),
        }))
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Most recent captured frame, shared with the stream and snapshot
    /// endpoints.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.frames.subscribe()
    }

    pub fn latest_result(&self) -> Option<ClassificationResult> {
        self.results.latest()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<Option<ClassificationResult>> {
        self.results.subscribe()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Cancels the pipeline and waits for its tasks. Tasks that outlive the
    /// grace period are aborted; dropping the capture task kills the decoder
    /// process, so the device is released either way.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        let prev = self.state.send_replace(SessionState::Stopping);
        if prev.is_active() {
            ACTIVE_SESSIONS.dec();
        }
        self.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        for mut task in tasks.drain(..) {
            if time::timeout(grace, &mut task).await.is_err() {
                warn!(
                    camera_id = %self.camera.id,
                    grace_ms = grace.as_millis() as u64,
                    "pipeline task exceeded stop grace, aborting"
                );
                task.abort();
                let _ = task.await;
            }
        }

        self.state.send_replace(SessionState::Stopped);
        info!(camera_id = %self.camera.id, "camera session stopped");
    }
}

async fn capture_loop(
    mut source: Box<dyn FrameSource>,
    camera_id: String,
    queue: Arc<FrameQueue<Arc<Frame>>>,
    frames: Arc<watch::Sender<Option<Arc<Frame>>>>,
    state: Arc<watch::Sender<SessionState>>,
    last_error: Arc<RwLock<Option<String>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next_frame() => frame,
        };
        match next {
            Ok(frame) => {
                FRAMES_CAPTURED.with_label_values(&[&camera_id]).inc();
                let frame = Arc::new(frame);
                frames.send_replace(Some(frame.clone()));
                if queue.push(frame) {
                    FRAMES_DROPPED.with_label_values(&[&camera_id]).inc();
                }
            }
            Err(e) => {
                error!(camera_id = %camera_id, error = %e, "capture failed, stopping session");
                *last_error.write().await = Some(e.to_string());
                let prev = state.send_replace(SessionState::Stopped);
                if prev.is_active() {
                    ACTIVE_SESSIONS.dec();
                }
                cancel.cancel();
                break;
            }
        }
    }
    source.close().await;
    queue.close();
    debug!(camera_id = %camera_id, "capture loop stopped");
}

struct SessionDeps {
    classifier: Arc<dyn ClassifierClient>,
    alert_tx: mpsc::Sender<AlertWork>,
    policy: AlertPolicy,
    capture: CaptureSettings,
    classify_timeout: Duration,
    inference_interval: Duration,
    stop_grace: Duration,
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<String, Arc<CameraSession>>>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(
        config: &Config,
        classifier: Arc<dyn ClassifierClient>,
        alert_tx: mpsc::Sender<AlertWork>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                deps: SessionDeps {
                    classifier,
                    alert_tx,
                    policy: config.alert_policy.clone(),
                    capture: config.capture.clone(),
                    classify_timeout: config.classify_timeout,
                    inference_interval: config.inference_interval,
                    stop_grace: config.stop_grace,
                },
            }),
        }
    }

    /// Starts a session for the camera. Idempotent: an active session is
    /// returned as-is, a crashed one is swept and replaced.
    pub async fn start(&self, camera: CameraConfig) -> Result<Arc<CameraSession>, SessionError> {
        self.inner.deps.policy.validate()?;

        let mut sessions = self.inner.sessions.lock().await;
        if let Some(existing) = sessions.get(&camera.id) {
            if existing.state() != SessionState::Stopped {
                debug!(camera_id = %camera.id, "session already active");
                return Ok(existing.clone());
            }
            sessions.remove(&camera.id);
        }

        let session = CameraSession::launch(camera, &self.inner.deps)?;
        sessions.insert(session.camera().id.clone(), session.clone());
        ACTIVE_SESSIONS.inc();
        Ok(session)
    }

    /// Stops and removes the camera's session. No-op when none is running.
    /// Holds the registry lock for the whole stop, so a concurrent start of
    /// the same camera waits until the decoder is released.
    pub async fn stop(&self, camera_id: &str) -> SessionState {
        let mut sessions = self.inner.sessions.lock().await;
        let Some(session) = sessions.remove(camera_id) else {
            return SessionState::Stopped;
        };
        session.shutdown(self.inner.deps.stop_grace).await;
        SessionState::Stopped
    }

    pub async fn get(&self, camera_id: &str) -> Option<Arc<CameraSession>> {
        self.inner.sessions.lock().await.get(camera_id).cloned()
    }

    pub async fn state_of(&self, camera_id: &str) -> SessionState {
        match self.get(camera_id).await {
            Some(session) => session.state(),
            None => SessionState::Stopped,
        }
    }

    pub async fn running_count(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| s.state() == SessionState::Running)
            .count()
    }

    /// Stops every session; used on node shutdown.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.inner.sessions.lock().await;
        for (camera_id, session) in sessions.drain() {
            debug!(camera_id = %camera_id, "stopping session for node shutdown");
            session.shutdown(self.inner.deps.stop_grace).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::error::CaptureError;

    struct FailingSource;

    #[async_trait]
    impl FrameSource for FailingSource {
        async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            Err(CaptureError::Exhausted {
                attempts: 3,
                reason: "decoder gone".to_string(),
            })
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_capture_failure_stops_session_and_cancels_pipeline() {
        let queue: Arc<FrameQueue<Arc<Frame>>> = Arc::new(FrameQueue::new());
        let frames = Arc::new(watch::channel(None).0);
        let state = Arc::new(watch::channel(SessionState::Running).0);
        let last_error = Arc::new(RwLock::new(None));
        let cancel = CancellationToken::new();

        capture_loop(
            Box::new(FailingSource),
            "cam-1".to_string(),
            queue.clone(),
            frames,
            state.clone(),
            last_error.clone(),
            cancel.clone(),
        )
        .await;

        assert_eq!(*state.borrow(), SessionState::Stopped);
        assert!(cancel.is_cancelled());
        assert!(last_error
            .read()
            .await
            .as_deref()
            .unwrap()
            .contains("decoder gone"));
        // the mailbox is closed so the inference loop drains out
        assert!(queue.pop().await.is_none());
    }
}
