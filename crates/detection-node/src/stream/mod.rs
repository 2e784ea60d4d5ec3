//! MJPEG live preview.
//!
//! Each viewer gets an independent `multipart/x-mixed-replace` body that
//! re-serves the session's latest frame at the configured rate. Viewers never
//! apply backpressure to capture or inference; a slow client simply sees
//! fewer distinct frames.

pub mod overlay;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use common::cameras::SessionState;
use common::frames::{ClassificationResult, Frame};

use crate::session::CameraSession;

pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Upper bound on parts served per second to one viewer.
    pub fps: u32,
    /// Draw the current classification onto each served frame.
    pub overlay: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            fps: 15,
            overlay: true,
        }
    }
}

struct ViewerGauge;

impl ViewerGauge {
    fn register() -> Self {
        telemetry::metrics::STREAM_CLIENTS.inc();
        Self
    }
}

impl Drop for ViewerGauge {
    fn drop(&mut self) {
        telemetry::metrics::STREAM_CLIENTS.dec();
    }
}

/// Builds the streaming response body for one viewer. The body ends when the
/// session reaches `Stopped` or the client disconnects.
pub fn mjpeg_body(session: Arc<CameraSession>, settings: StreamSettings) -> Body {
    let stream = async_stream::stream! {
        let _viewer = ViewerGauge::register();
        let gap = Duration::from_millis(1_000 / u64::from(settings.fps.max(1)));
        let mut ticker = time::interval(gap);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if session.state() == SessionState::Stopped {
                break;
            }
            let Some(frame) = session.latest_frame() else {
                // session is starting up, nothing captured yet
                continue;
            };
            let result = if settings.overlay {
                session.latest_result()
            } else {
                None
            };
            yield Ok::<Bytes, Infallible>(encode_part(&frame, result.as_ref(), settings.overlay));
        }
        debug!(camera_id = %session.camera().id, "viewer stream closed");
    };
    Body::from_stream(stream)
}

fn encode_part(frame: &Frame, result: Option<&ClassificationResult>, overlay: bool) -> Bytes {
    let jpeg = if overlay {
        match overlay::annotate(&frame.data, result) {
            Ok(annotated) => annotated,
            Err(err) => {
                debug!(
                    camera_id = %frame.camera_id,
                    error = %err,
                    "overlay failed, serving raw frame"
                );
                frame.data.clone()
            }
        }
    } else {
        frame.data.clone()
    };

    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(&jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}
