//! Alert side effects, moved off the inference path.
//!
//! One dispatcher task serves all cameras: it writes the evidence snapshot,
//! persists the event and pushes notifications. Failures are logged and
//! reflected in the event's delivery status; nothing here retries or stops
//! the pipeline.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::alerts::{AlertEvent, DeliveryStatus};
use common::contracts::{AlertStore, NotificationChannel, SnapshotStore};
use common::frames::Frame;
use telemetry::metrics::ALERTS_UNDELIVERED;

/// Queue depth between the inference loops and the dispatcher. Alerts are
/// rare; a full queue means downstream is stuck and the event is dropped.
pub const ALERT_QUEUE_DEPTH: usize = 16;

/// A fired alert plus the frame that triggered it.
pub struct AlertWork {
    pub event: AlertEvent,
    pub frame: Arc<Frame>,
}

pub struct AlertDispatcher {
    snapshots: Arc<dyn SnapshotStore>,
    store: Arc<dyn AlertStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl AlertDispatcher {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        store: Arc<dyn AlertStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Self {
        Self {
            snapshots,
            store,
            channels,
        }
    }

    pub fn spawn(
        self,
        mut rx: mpsc::Receiver<AlertWork>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let work = tokio::select! {
                    _ = cancel.cancelled() => break,
                    work = rx.recv() => match work {
                        Some(work) => work,
                        None => break,
                    },
                };
                self.handle(work).await;
            }
            debug!("alert dispatcher stopped");
        })
    }

    async fn handle(&self, work: AlertWork) {
        let AlertWork { mut event, frame } = work;

        match self
            .snapshots
            .save(&frame, &event.label, event.fired_at)
            .await
        {
            Ok(reference) => event.snapshot_ref = Some(reference),
            Err(e) => {
                // the alert still goes out, just without evidence
                ALERTS_UNDELIVERED
                    .with_label_values(&[&event.camera_id, "snapshot"])
                    .inc();
                warn!(
                    camera_id = %event.camera_id,
                    error = %e,
                    "failed to write alert snapshot"
                );
            }
        }

        let mut delivered = true;

        if let Err(e) = self.store.record(&event).await {
            delivered = false;
            ALERTS_UNDELIVERED
                .with_label_values(&[&event.camera_id, "store"])
                .inc();
            error!(
                camera_id = %event.camera_id,
                event_id = %event.id,
                error = %e,
                "failed to persist alert event"
            );
        }

        for channel in &self.channels {
            match channel.send(&event).await {
                Ok(()) => {
                    info!(
                        camera_id = %event.camera_id,
                        event_id = %event.id,
                        channel = channel.name(),
                        "alert notification sent"
                    );
                }
                Err(e) => {
                    delivered = false;
                    ALERTS_UNDELIVERED
                        .with_label_values(&[&event.camera_id, "notify"])
                        .inc();
                    error!(
                        camera_id = %event.camera_id,
                        event_id = %event.id,
                        channel = channel.name(),
                        error = %e,
                        "alert notification failed"
                    );
                }
            }
        }

        let status = if delivered {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Failed
        };
        if let Err(e) = self.store.update_delivery(event.id, status).await {
            warn!(event_id = %event.id, error = %e, "failed to update delivery status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    use common::error::SendError;

    use crate::alert::snapshot::FsSnapshotStore;
    use crate::alert::store::MemoryAlertStore;

    struct RecordingChannel {
        sent: Mutex<Vec<AlertEvent>>,
        fail: bool,
    }

    impl RecordingChannel {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, event: &AlertEvent) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::new("recording", "scripted failure"));
            }
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn work(label: &str) -> AlertWork {
        AlertWork {
            event: AlertEvent {
                id: Uuid::new_v4(),
                camera_id: "cam-1".to_string(),
                label: label.to_string(),
                confidence: 0.9,
                fired_at: Utc::now(),
                snapshot_ref: None,
                delivery: DeliveryStatus::Pending,
            },
            frame: Arc::new(Frame {
                camera_id: "cam-1".to_string(),
                seq: 1,
                captured_at: Utc::now(),
                width: 2,
                height: 2,
                data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
            }),
        }
    }

    #[tokio::test]
    async fn test_dispatch_persists_snapshot_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryAlertStore::new());
        let channel = Arc::new(RecordingChannel::new(false));

        let dispatcher = AlertDispatcher::new(
            Arc::new(FsSnapshotStore::new(dir.path())),
            store.clone(),
            vec![channel.clone()],
        );
        dispatcher.handle(work("Assault")).await;

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].delivery, DeliveryStatus::Delivered);

        let reference = recent[0].snapshot_ref.clone().unwrap();
        assert!(dir.path().join(&reference).exists());
        assert_eq!(channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_marks_event_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryAlertStore::new());
        let failing = Arc::new(RecordingChannel::new(true));
        let working = Arc::new(RecordingChannel::new(false));

        let dispatcher = AlertDispatcher::new(
            Arc::new(FsSnapshotStore::new(dir.path())),
            store.clone(),
            vec![failing, working.clone()],
        );
        dispatcher.handle(work("Arson")).await;

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent[0].delivery, DeliveryStatus::Failed);
        // remaining channels still ran after the failure
        assert_eq!(working.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_drains_queue_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryAlertStore::new());

        let dispatcher = AlertDispatcher::new(
            Arc::new(FsSnapshotStore::new(dir.path())),
            store.clone(),
            Vec::new(),
        );
        let (tx, rx) = mpsc::channel(ALERT_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let handle = dispatcher.spawn(rx, cancel);

        tx.send(work("Assault")).await.unwrap();
        tx.send(work("Arson")).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
