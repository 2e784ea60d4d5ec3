//! Classifier clients: the production HTTP client and a scripted double
//! for tests and development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use common::contracts::ClassifierClient;
use common::error::ClassifyError;
use common::frames::{Classification, Frame};

/// Talks to the external classification service over HTTP.
///
/// The service receives the JPEG frame base64-encoded and answers with a
/// label and a confidence in `[0, 1]`. Anything else is a malformed
/// response and the frame is skipped upstream.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    label: String,
    confidence: f32,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let endpoint = format!("{}/v1/classify", base_url.trim_end_matches('/'));
        Self { client, endpoint }
    }
}

#[async_trait]
impl ClassifierClient for HttpClassifier {
    async fn classify(&self, frame: &Frame) -> Result<Classification, ClassifyError> {
        let payload = json!({
            "camera_id": frame.camera_id,
            "sequence": frame.seq,
            "timestamp_ms": frame.captured_at.timestamp_millis(),
            "format": "jpeg",
            "data": general_purpose::STANDARD.encode(&frame.data),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClassifyError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifyError::Http(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Malformed(e.to_string()))?;

        if !body.confidence.is_finite() || !(0.0..=1.0).contains(&body.confidence) {
            return Err(ClassifyError::Malformed(format!(
                "confidence {} out of range",
                body.confidence
            )));
        }

        debug!(
            camera_id = %frame.camera_id,
            seq = frame.seq,
            label = %body.label,
            confidence = body.confidence,
            "classifier response"
        );
        Ok(Classification {
            label: body.label,
            confidence: body.confidence,
        })
    }
}

/// Deterministic classifier for tests and camera-less development.
///
/// Scripted responses are consumed front to back; once the script is empty
/// every call answers with the fallback classification.
pub struct ScriptedClassifier {
    fallback: Classification,
    script: Mutex<VecDeque<Result<Classification, ClassifyError>>>,
    delay: Option<Duration>,
    calls: AtomicU64,
}

impl ScriptedClassifier {
    pub fn new(fallback_label: &str, fallback_confidence: f32) -> Self {
        Self {
            fallback: Classification {
                label: fallback_label.to_string(),
                confidence: fallback_confidence,
            },
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Makes every call take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, label: &str, confidence: f32) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(Classification {
                label: label.to_string(),
                confidence,
            }));
        }
    }

    pub fn push_error(&self, reason: &str) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(ClassifyError::Http(reason.to_string())));
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ClassifierClient for ScriptedClassifier {
    async fn classify(&self, _frame: &Frame) -> Result<Classification, ClassifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.fetch_add(1, Ordering::Relaxed);

        let scripted = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(_) => None,
        };
        match scripted {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    fn frame() -> Frame {
        Frame {
            camera_id: "cam-1".to_string(),
            seq: 1,
            captured_at: Utc::now(),
            width: 2,
            height: 2,
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        }
    }

    #[tokio::test]
    async fn test_scripted_responses_then_fallback() {
        let classifier = ScriptedClassifier::new("Normal", 0.2);
        classifier.push("Assault", 0.9);
        classifier.push_error("unreachable");

        let first = classifier.classify(&frame()).await.unwrap();
        assert_eq!(first.label, "Assault");

        assert!(classifier.classify(&frame()).await.is_err());

        let fallback = classifier.classify(&frame()).await.unwrap();
        assert_eq!(fallback.label, "Normal");
        assert_eq!(classifier.calls(), 3);
    }
}
