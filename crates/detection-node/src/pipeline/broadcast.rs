//! Latest classification result per camera, readable by any number of
//! consumers without blocking the inference loop.

use tokio::sync::watch;

use common::frames::ClassificationResult;

pub struct ResultBroadcaster {
    tx: watch::Sender<Option<ClassificationResult>>,
}

impl ResultBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publishes a new result, overwriting the previous one. Never blocks,
    /// even with no subscribers.
    pub fn publish(&self, result: ClassificationResult) {
        self.tx.send_replace(Some(result));
    }

    /// Most recent result, if any. Reading does not consume it.
    pub fn latest(&self) -> Option<ClassificationResult> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ClassificationResult>> {
        self.tx.subscribe()
    }
}

impl Default for ResultBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(label: &str) -> ClassificationResult {
        ClassificationResult {
            camera_id: "cam-1".to_string(),
            label: label.to_string(),
            confidence: 0.5,
            captured_at: Utc::now(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_starts_empty() {
        let broadcaster = ResultBroadcaster::new();
        assert!(broadcaster.latest().is_none());
    }

    #[test]
    fn test_publish_overwrites_previous() {
        let broadcaster = ResultBroadcaster::new();
        broadcaster.publish(result("Normal"));
        broadcaster.publish(result("Assault"));

        let latest = broadcaster.latest().unwrap();
        assert_eq!(latest.label, "Assault");
    }

    #[test]
    fn test_reads_do_not_consume() {
        let broadcaster = ResultBroadcaster::new();
        broadcaster.publish(result("Normal"));

        assert_eq!(broadcaster.latest().unwrap().label, "Normal");
        assert_eq!(broadcaster.latest().unwrap().label, "Normal");
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let broadcaster = ResultBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(result("Arson"));
        rx.changed().await.unwrap();

        let seen = rx.borrow().clone().unwrap();
        assert_eq!(seen.label, "Arson");
    }
}
