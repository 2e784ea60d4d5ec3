//! Trait seams between the pipeline and its external dependencies.
//!
//! Production wires in the HTTP classifier, Postgres, SMTP and the
//! filesystem; tests swap in scripted doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::alerts::{AlertEvent, DeliveryStatus};
use crate::error::{ClassifyError, SendError, SnapshotError, StoreError};
use crate::frames::{Classification, Frame};

/// Sends a frame to the classification model and returns its verdict.
#[async_trait]
pub trait ClassifierClient: Send + Sync {
    async fn classify(&self, frame: &Frame) -> Result<Classification, ClassifyError>;
}

/// Durable record of fired alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn record(&self, event: &AlertEvent) -> Result<(), StoreError>;

    /// Updates the delivery outcome of a recorded alert. Unknown ids are a
    /// no-op so a failed `record` does not cascade.
    async fn update_delivery(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError>;

    /// Most recent alerts, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<AlertEvent>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

/// Pushes a fired alert to an external sink such as email or a webhook.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &AlertEvent) -> Result<(), SendError>;
}

/// Writes evidence frames for fired alerts.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Saves the frame and returns a reference usable in the alert record.
    async fn save(
        &self,
        frame: &Frame,
        label: &str,
        fired_at: DateTime<Utc>,
    ) -> Result<String, SnapshotError>;
}
