//! Frame and classification types shared between the capture pipeline and
//! the alert engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded video frame, encoded as JPEG.
///
/// Frames are wrapped in `Arc` as soon as they leave the capture loop so the
/// mailbox, the live stream and the snapshot writer can share one buffer
/// without copying pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Camera this frame was captured from.
    pub camera_id: String,
    /// Monotonic per-camera sequence number, starting at 1.
    pub seq: u64,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
    /// Pixel width, 0 when the decoder did not report dimensions.
    pub width: u32,
    /// Pixel height, 0 when the decoder did not report dimensions.
    pub height: u32,
    /// JPEG bytes.
    pub data: Bytes,
}

/// Raw model output for one frame: a label and how sure the model is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub label: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
}

/// A classification tied back to the frame and camera it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub camera_id: String,
    /// Label as returned by the classifier, not normalized.
    pub label: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// When the frame was captured.
    pub captured_at: DateTime<Utc>,
    /// When the classifier response was observed by the pipeline.
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_result_serialization() {
        let result = ClassificationResult {
            camera_id: "cam-1".to_string(),
            label: "Assault".to_string(),
            confidence: 0.91,
            captured_at: Utc::now(),
            observed_at: Utc::now(),
        };

        let json = serde_json::to_string(&result).unwrap();
        let parsed: ClassificationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.camera_id, "cam-1");
        assert_eq!(parsed.label, "Assault");
        assert!((parsed.confidence - 0.91).abs() < f32::EPSILON);
    }
}
