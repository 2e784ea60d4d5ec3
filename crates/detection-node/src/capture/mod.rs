pub mod ffmpeg;
pub mod test_pattern;

use async_trait::async_trait;

use common::cameras::{CameraConfig, VideoSource};
use common::error::CaptureError;
use common::frames::Frame;

pub use ffmpeg::FfmpegSource;
pub use test_pattern::TestPatternSource;

/// Produces frames from one camera in capture order.
///
/// Implementations retry transient problems internally; an error from
/// `next_frame` is fatal and ends the session.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the underlying capture resource.
    async fn close(&mut self);
}

/// Decoder restart behavior for transient capture failures.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub max_retries: u32,
    pub backoff_start_ms: u64,
    pub backoff_max_ms: u64,
}

impl RestartPolicy {
    /// Exponential backoff for the given attempt, starting at 1.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(16);
        (self.backoff_start_ms << shift).min(self.backoff_max_ms)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_start_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Frames per second requested from the decoder.
    pub fps: u32,
    /// Output width in pixels, 0 keeps the source resolution.
    pub width: u32,
    /// ffmpeg MJPEG quality, 2 (best) to 31 (worst).
    pub jpeg_quality: u32,
    pub restart: RestartPolicy,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: 15,
            width: 640,
            jpeg_quality: 5,
            restart: RestartPolicy::default(),
        }
    }
}

/// Opens the frame source for a camera.
pub fn open_source(
    camera: &CameraConfig,
    settings: &CaptureSettings,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    match &camera.source {
        VideoSource::Uri { uri } => Ok(Box::new(FfmpegSource::open(
            camera.id.clone(),
            uri.clone(),
            settings.clone(),
        )?)),
        VideoSource::TestPattern => Ok(Box::new(TestPatternSource::new(
            camera.id.clone(),
            settings.fps,
            settings.width,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RestartPolicy {
            max_retries: 5,
            backoff_start_ms: 500,
            backoff_max_ms: 10_000,
        };
        assert_eq!(policy.backoff_ms(1), 500);
        assert_eq!(policy.backoff_ms(2), 1_000);
        assert_eq!(policy.backoff_ms(3), 2_000);
        assert_eq!(policy.backoff_ms(6), 10_000);
        assert_eq!(policy.backoff_ms(60), 10_000);
    }
}
