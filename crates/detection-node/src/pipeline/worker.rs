//! Per-camera inference loop.
//!
//! Pops the freshest frame from the mailbox, calls the classifier, publishes
//! the result and feeds the alert evaluator. Classifier failures are logged
//! and the frame is skipped; the loop only exits on cancellation or when the
//! mailbox closes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::contracts::ClassifierClient;
use common::frames::{ClassificationResult, Frame};
use telemetry::metrics::{ALERTS_FIRED, ALERTS_UNDELIVERED, INFERENCE_LATENCY, INFERENCE_REQUESTS};

use crate::alert::{AlertEvaluator, AlertWork};

use super::broadcast::ResultBroadcaster;
use super::frame_queue::FrameQueue;

pub struct InferenceWorker {
    pub camera_id: String,
    pub queue: Arc<FrameQueue<Arc<Frame>>>,
    pub classifier: Arc<dyn ClassifierClient>,
    pub results: Arc<ResultBroadcaster>,
    pub evaluator: AlertEvaluator,
    pub alert_tx: mpsc::Sender<AlertWork>,
    pub classify_timeout: Duration,
    pub inference_interval: Duration,
    pub cancel: CancellationToken,
}

impl InferenceWorker {
    pub async fn run(mut self) {
        let mut pace = time::interval(self.inference_interval.max(Duration::from_millis(1)));
        pace.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = pace.tick() => {}
            }

            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                popped = self.queue.pop() => match popped {
                    Some(frame) => frame,
                    None => break,
                },
            };

            self.classify_one(frame).await;
        }

        debug!(camera_id = %self.camera_id, "inference loop stopped");
    }

    async fn classify_one(&mut self, frame: Arc<Frame>) {
        let started = Instant::now();
        match time::timeout(self.classify_timeout, self.classifier.classify(&frame)).await {
            Ok(Ok(classification)) => {
                INFERENCE_LATENCY
                    .with_label_values(&[&self.camera_id])
                    .observe(started.elapsed().as_secs_f64());
                INFERENCE_REQUESTS
                    .with_label_values(&[&self.camera_id, "success"])
                    .inc();

                let result = ClassificationResult {
                    camera_id: self.camera_id.clone(),
                    label: classification.label,
                    confidence: classification.confidence,
                    captured_at: frame.captured_at,
                    observed_at: Utc::now(),
                };
                debug!(
                    camera_id = %self.camera_id,
                    seq = frame.seq,
                    label = %result.label,
                    confidence = result.confidence,
                    "frame classified"
                );
                self.results.publish(result.clone());

                if let Some(event) = self.evaluator.observe(&result) {
                    ALERTS_FIRED
                        .with_label_values(&[&self.camera_id, &event.label])
                        .inc();
                    info!(
                        camera_id = %self.camera_id,
                        label = %event.label,
                        confidence = event.confidence,
                        "alert fired"
                    );
                    if let Err(e) = self.alert_tx.try_send(AlertWork { event, frame }) {
                        ALERTS_UNDELIVERED
                            .with_label_values(&[&self.camera_id, "queue"])
                            .inc();
                        error!(
                            camera_id = %self.camera_id,
                            error = %e,
                            "alert dispatcher backlogged, event dropped"
                        );
                    }
                }
            }
            Ok(Err(e)) => {
                INFERENCE_REQUESTS
                    .with_label_values(&[&self.camera_id, "error"])
                    .inc();
                warn!(
                    camera_id = %self.camera_id,
                    seq = frame.seq,
                    error = %e,
                    "classification failed, skipping frame"
                );
            }
            Err(_) => {
                INFERENCE_REQUESTS
                    .with_label_values(&[&self.camera_id, "timeout"])
                    .inc();
                warn!(
                    camera_id = %self.camera_id,
                    seq = frame.seq,
                    timeout_ms = self.classify_timeout.as_millis() as u64,
                    "classifier timed out, skipping frame"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::alerts::AlertPolicy;

    use crate::classify::ScriptedClassifier;

    fn frame(seq: u64) -> Arc<Frame> {
        Arc::new(Frame {
            camera_id: "cam-1".to_string(),
            seq,
            captured_at: Utc::now(),
            width: 64,
            height: 48,
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        })
    }

    fn worker(
        classifier: Arc<ScriptedClassifier>,
        policy: AlertPolicy,
    ) -> (
        InferenceWorker,
        Arc<FrameQueue<Arc<Frame>>>,
        Arc<ResultBroadcaster>,
        mpsc::Receiver<AlertWork>,
        CancellationToken,
    ) {
        let queue = Arc::new(FrameQueue::new());
        let results = Arc::new(ResultBroadcaster::new());
        let (alert_tx, alert_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let worker = InferenceWorker {
            camera_id: "cam-1".to_string(),
            queue: queue.clone(),
            classifier,
            results: results.clone(),
            evaluator: AlertEvaluator::new(policy),
            alert_tx,
            classify_timeout: Duration::from_secs(1),
            inference_interval: Duration::from_millis(1),
            cancel: cancel.clone(),
        };
        (worker, queue, results, alert_rx, cancel)
    }

    #[tokio::test]
    async fn test_publishes_results_and_exits_on_close() {
        let classifier = Arc::new(ScriptedClassifier::new("Normal", 0.3));
        let (worker, queue, results, _alert_rx, _cancel) =
            worker(classifier, AlertPolicy::default());

        let handle = tokio::spawn(worker.run());
        queue.push(frame(1));

        let mut rx = results.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.latest().unwrap().label, "Normal");

        queue.close();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_classifier_failure_skips_frame() {
        let classifier = Arc::new(ScriptedClassifier::new("Normal", 0.3));
        classifier.push_error("boom");
        let (worker, queue, results, _alert_rx, cancel) =
            worker(classifier, AlertPolicy::default());

        let handle = tokio::spawn(worker.run());
        queue.push(frame(1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the failed frame produced no result, the loop is still alive
        assert!(results.latest().is_none());
        queue.push(frame(2));
        let mut rx = results.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.latest().unwrap().label, "Normal");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_qualifying_detection_hands_off_alert() {
        let classifier = Arc::new(ScriptedClassifier::new("Assault", 0.95));
        let (worker, queue, _results, mut alert_rx, cancel) =
            worker(classifier, AlertPolicy::default());

        let handle = tokio::spawn(worker.run());
        queue.push(frame(1));

        let work = tokio::time::timeout(Duration::from_secs(1), alert_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(work.event.camera_id, "cam-1");
        assert_eq!(work.event.label, "Assault");
        assert_eq!(work.frame.seq, 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
