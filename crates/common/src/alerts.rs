//! Alert events and the policy that decides when they fire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ConfigError;

/// Delivery outcome for a fired alert. Alerts start as `Pending` and are
/// marked once persistence and notification have been attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// A fired alert, ready for persistence and notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub camera_id: String,
    /// Label as returned by the classifier, not normalized.
    pub label: String,
    pub confidence: f32,
    /// Observation time of the classification that triggered the alert.
    pub fired_at: DateTime<Utc>,
    /// Path of the evidence snapshot, relative to the snapshot root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_ref: Option<String>,
    pub delivery: DeliveryStatus,
}

/// Thresholds controlling when a classification becomes an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPolicy {
    /// Classifications below this confidence never alert.
    pub confidence_threshold: f32,
    /// How many consecutive classifications of the same label are needed.
    pub required_repeats: u32,
    /// Minimum gap between two alerts from the same camera.
    pub cooldown: Duration,
    /// Normalized labels that never alert regardless of confidence.
    pub normal_labels: HashSet<String>,
}

impl AlertPolicy {
    /// Labels treated as non-alerting when the operator configures nothing.
    /// The empty string covers classifiers that return blank labels.
    pub fn default_normal_labels() -> HashSet<String> {
        ["normal", "normal videos", "unknown", ""]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(ConfigError::Invalid {
                key: "confidence_threshold",
                reason: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }
        if self.required_repeats == 0 {
            return Err(ConfigError::Invalid {
                key: "required_repeats",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            required_repeats: 1,
            cooldown: Duration::from_secs(8),
            normal_labels: Self::default_normal_labels(),
        }
    }
}
