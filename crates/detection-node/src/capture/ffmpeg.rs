//! ffmpeg-backed frame source.
//!
//! Spawns `ffmpeg` decoding the camera URI into an MJPEG byte stream on
//! stdout and splits that stream on JPEG markers. Transient decoder failures
//! are retried with exponential backoff; only running out of retries
//! surfaces as an error.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use common::error::CaptureError;
use common::frames::Frame;
use telemetry::metrics::CAPTURE_RESTARTS;

use super::{CaptureSettings, FrameSource};

const READ_BUF_SIZE: usize = 64 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct FfmpegSource {
    camera_id: String,
    uri: String,
    settings: CaptureSettings,
    child: Child,
    stdout: ChildStdout,
    scanner: JpegFrameScanner,
    read_buf: Vec<u8>,
    seq: u64,
}

impl FfmpegSource {
    pub fn open(
        camera_id: String,
        uri: String,
        settings: CaptureSettings,
    ) -> Result<Self, CaptureError> {
        let (child, stdout) = spawn_decoder(&uri, &settings)?;
        Ok(Self {
            camera_id,
            uri,
            settings,
            child,
            stdout,
            scanner: JpegFrameScanner::new(),
            read_buf: vec![0u8; READ_BUF_SIZE],
            seq: 0,
        })
    }

    async fn read_next_jpeg(&mut self) -> Result<Bytes, String> {
        loop {
            if let Some(jpeg) = self.scanner.take_frame() {
                return Ok(jpeg);
            }
            let n = self
                .stdout
                .read(&mut self.read_buf)
                .await
                .map_err(|e| format!("read from decoder: {}", e))?;
            if n == 0 {
                return Err("decoder closed its output".to_string());
            }
            self.scanner.extend(&self.read_buf[..n]);
        }
    }

    async fn respawn(&mut self) -> Result<(), String> {
        self.child.start_kill().ok();
        let _ = self.child.wait().await;
        let (child, stdout) = spawn_decoder(&self.uri, &self.settings).map_err(|e| e.to_string())?;
        self.child = child;
        self.stdout = stdout;
        self.scanner.reset();
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut attempts: u32 = 0;
        loop {
            match self.read_next_jpeg().await {
                Ok(data) => {
                    self.seq += 1;
                    return Ok(Frame {
                        camera_id: self.camera_id.clone(),
                        seq: self.seq,
                        captured_at: Utc::now(),
                        width: self.settings.width,
                        height: 0,
                        data,
                    });
                }
                Err(reason) => {
                    attempts += 1;
                    if attempts > self.settings.restart.max_retries {
                        return Err(CaptureError::Exhausted {
                            attempts: attempts - 1,
                            reason,
                        });
                    }
                    let backoff = self.settings.restart.backoff_ms(attempts);
                    warn!(
                        camera_id = %self.camera_id,
                        attempt = attempts,
                        backoff_ms = backoff,
                        error = %reason,
                        "capture failed, restarting decoder"
                    );
                    CAPTURE_RESTARTS
                        .with_label_values(&[&self.camera_id])
                        .inc();
                    time::sleep(Duration::from_millis(backoff)).await;
                    if let Err(e) = self.respawn().await {
                        warn!(camera_id = %self.camera_id, error = %e, "decoder respawn failed");
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        self.child.start_kill().ok();
        let _ = self.child.wait().await;
        debug!(camera_id = %self.camera_id, "ffmpeg decoder closed");
    }
}

fn spawn_decoder(uri: &str, settings: &CaptureSettings) -> Result<(Child, ChildStdout), CaptureError> {
    let mut args: Vec<String> = vec![
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        uri.to_string(),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-codec:v".to_string(),
        "mjpeg".to_string(),
    ];
    if settings.fps > 0 {
        args.push("-r".to_string());
        args.push(settings.fps.to_string());
    }
    if settings.width > 0 {
        args.push("-vf".to_string());
        args.push(format!("scale={}:-1", settings.width));
    }
    args.push("-q:v".to_string());
    args.push(settings.jpeg_quality.clamp(2, 31).to_string());
    args.push("pipe:1".to_string());

    debug!(?args, "spawning ffmpeg decoder");

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CaptureError::Open(format!("failed to spawn ffmpeg: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Open("ffmpeg stdout unavailable".to_string()))?;

    Ok((child, stdout))
}

/// Splits a raw MJPEG byte stream into individual JPEG frames.
///
/// Bytes before a start-of-image marker are discarded, so the scanner
/// resynchronizes after decoder restarts mid-frame.
pub struct JpegFrameScanner {
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl JpegFrameScanner {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes: 8 * 1024 * 1024,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Next complete frame, or `None` until more bytes arrive.
    pub fn take_frame(&mut self) -> Option<Bytes> {
        let Some(soi) = find_marker(&self.buf, SOI) else {
            // keep the tail byte in case a marker is split across reads
            if self.buf.len() > 1 {
                let tail = self.buf.len() - 1;
                self.buf.drain(..tail);
            }
            return None;
        };
        if soi > 0 {
            self.buf.drain(..soi);
        }

        let Some(eoi) = find_marker(&self.buf[2..], EOI).map(|i| i + 2) else {
            if self.buf.len() > self.max_frame_bytes {
                // no end marker within any plausible frame size, resync
                self.buf.clear();
            }
            return None;
        };

        let end = eoi + 2;
        let frame: Vec<u8> = self.buf.drain(..end).collect();
        Some(Bytes::from(frame))
    }
}

impl Default for JpegFrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buf: &[u8], marker: [u8; 2]) -> Option<usize> {
    buf.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&EOI);
        frame
    }

    #[test]
    fn test_scanner_splits_concatenated_frames() {
        let first = fake_jpeg(&[0x01, 0x02, 0x03]);
        let second = fake_jpeg(&[0xAA, 0xBB]);

        let mut scanner = JpegFrameScanner::new();
        scanner.extend(&first);
        scanner.extend(&second);

        assert_eq!(scanner.take_frame().unwrap().as_ref(), first.as_slice());
        assert_eq!(scanner.take_frame().unwrap().as_ref(), second.as_slice());
        assert!(scanner.take_frame().is_none());
    }

    #[test]
    fn test_scanner_handles_partial_reads() {
        let frame = fake_jpeg(&[0x10, 0x20, 0x30, 0x40]);

        let mut scanner = JpegFrameScanner::new();
        for chunk in frame.chunks(3) {
            scanner.extend(chunk);
        }
        // feeding byte by byte must not lose the split end marker
        assert_eq!(scanner.take_frame().unwrap().as_ref(), frame.as_slice());
    }

    #[test]
    fn test_scanner_skips_garbage_before_frame() {
        let frame = fake_jpeg(&[0x55]);
        let mut stream = vec![0x00, 0x11, 0x22];
        stream.extend_from_slice(&frame);

        let mut scanner = JpegFrameScanner::new();
        scanner.extend(&stream);

        assert_eq!(scanner.take_frame().unwrap().as_ref(), frame.as_slice());
    }

    #[test]
    fn test_scanner_waits_for_end_marker() {
        let mut scanner = JpegFrameScanner::new();
        scanner.extend(&SOI);
        scanner.extend(&[0x01, 0x02]);
        assert!(scanner.take_frame().is_none());

        scanner.extend(&EOI);
        let frame = scanner.take_frame().unwrap();
        assert_eq!(&frame[..2], &SOI);
        assert_eq!(&frame[frame.len() - 2..], &EOI);
    }

    #[test]
    fn test_scanner_discards_oversized_garbage() {
        let mut scanner = JpegFrameScanner::new();
        scanner.max_frame_bytes = 16;

        scanner.extend(&SOI);
        scanner.extend(&[0u8; 32]);
        assert!(scanner.take_frame().is_none());

        // buffer was cleared, a fresh frame still parses
        let frame = fake_jpeg(&[0x01]);
        scanner.extend(&frame);
        assert_eq!(scanner.take_frame().unwrap().as_ref(), frame.as_slice());
    }
}
