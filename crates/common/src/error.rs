//! Error types for the capture, classification and alert paths.
//!
//! Each failure class gets its own enum so callers can tell a transient
//! capture hiccup from a bad configuration or a downstream outage.

use thiserror::Error;

/// Frame acquisition failures. Transient problems are retried inside the
/// source; anything surfacing here ends the session.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source: {0}")]
    Open(String),

    #[error("video source ended")]
    SourceEnded,

    #[error("capture failed after {attempts} restart attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Classifier call failures. These are logged and the frame is skipped;
/// they never stop the pipeline.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Http(String),

    #[error("classifier returned a malformed response: {0}")]
    Malformed(String),

    #[error("classifier timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Alert persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("alert store unavailable: {0}")]
    Unavailable(String),
}

/// A notification channel failed to deliver an alert.
#[derive(Debug, Error)]
#[error("{channel} delivery failed: {reason}")]
pub struct SendError {
    pub channel: &'static str,
    pub reason: String,
}

impl SendError {
    pub fn new(channel: &'static str, reason: impl ToString) -> Self {
        Self {
            channel,
            reason: reason.to_string(),
        }
    }
}

/// Snapshot write failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

/// Configuration problems, rejected before any session starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Failures from camera session control operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera '{0}' is not registered")]
    UnknownCamera(String),

    #[error("camera '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid alert policy: {0}")]
    Policy(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] CaptureError),
}
