//! Synthetic frame source cycling through solid-color JPEG frames.
//!
//! Used for development without a real camera and by the integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use tokio::time::{self, Duration, Interval, MissedTickBehavior};

use common::error::CaptureError;
use common::frames::Frame;

use super::FrameSource;

const PATTERN_COLORS: [[u8; 3]; 4] = [
    [40, 40, 48],
    [180, 60, 60],
    [60, 160, 80],
    [60, 90, 180],
];

pub struct TestPatternSource {
    camera_id: String,
    interval: Interval,
    frames: Vec<Bytes>,
    width: u32,
    height: u32,
    seq: u64,
}

impl TestPatternSource {
    pub fn new(camera_id: String, fps: u32, width: u32) -> Result<Self, CaptureError> {
        let width = if width == 0 { 320 } else { width };
        let height = width * 3 / 4;

        let mut frames = Vec::with_capacity(PATTERN_COLORS.len());
        for color in PATTERN_COLORS {
            frames.push(encode_solid(width, height, color)?);
        }

        let mut interval = time::interval(frame_period(fps));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            camera_id,
            interval,
            frames,
            width,
            height,
            seq: 0,
        })
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.interval.tick().await;
        let data = self.frames[self.seq as usize % self.frames.len()].clone();
        self.seq += 1;
        Ok(Frame {
            camera_id: self.camera_id.clone(),
            seq: self.seq,
            captured_at: Utc::now(),
            width: self.width,
            height: self.height,
            data,
        })
    }

    async fn close(&mut self) {}
}

fn frame_period(fps: u32) -> Duration {
    Duration::from_millis(1_000 / u64::from(fps.max(1)))
}

fn encode_solid(width: u32, height: u32, color: [u8; 3]) -> Result<Bytes, CaptureError> {
    let image = RgbImage::from_pixel(width, height, image::Rgb(color));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 80)
        .encode(image.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::Open(format!("failed to encode test pattern: {}", e)))?;
    Ok(Bytes::from(jpeg))
}
