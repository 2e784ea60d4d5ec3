//! Turns per-frame classifications into alert decisions.
//!
//! The evaluator is owned by one inference loop and sees results in arrival
//! order. All time arithmetic uses the observation timestamps carried by the
//! results, never the wall clock, so decisions are reproducible.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use common::alerts::{AlertEvent, AlertPolicy, DeliveryStatus};
use common::frames::ClassificationResult;

/// Lowercases and trims a label for comparison. Comparison is always done
/// on normalized labels; fired events keep the classifier's original label.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

pub struct AlertEvaluator {
    policy: AlertPolicy,
    cooldown: chrono::Duration,
    last_seen_label: String,
    consecutive_count: u32,
    last_alert_at: Option<DateTime<Utc>>,
}

impl AlertEvaluator {
    pub fn new(policy: AlertPolicy) -> Self {
        let cooldown = chrono::Duration::from_std(policy.cooldown)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        Self {
            policy,
            cooldown,
            last_seen_label: String::new(),
            consecutive_count: 0,
            last_alert_at: None,
        }
    }

    /// Feeds one classification into the state machine. Returns the alert to
    /// dispatch when this observation crosses the repeat threshold outside
    /// the cooldown window.
    pub fn observe(&mut self, result: &ClassificationResult) -> Option<AlertEvent> {
        let label = normalize_label(&result.label);

        // normal or low-confidence observations break any streak
        if self.policy.normal_labels.contains(&label)
            || result.confidence < self.policy.confidence_threshold
        {
            self.consecutive_count = 0;
            self.last_seen_label = label;
            return None;
        }

        if label == self.last_seen_label {
            self.consecutive_count = self.consecutive_count.saturating_add(1);
        } else {
            self.last_seen_label = label;
            self.consecutive_count = 1;
        }

        if self.consecutive_count < self.policy.required_repeats {
            return None;
        }

        if let Some(last) = self.last_alert_at {
            if result.observed_at.signed_duration_since(last) < self.cooldown {
                return None;
            }
        }

        // firing does not reset the streak; after the cooldown the next
        // qualifying observation may fire again
        self.last_alert_at = Some(result.observed_at);
        Some(AlertEvent {
            id: Uuid::new_v4(),
            camera_id: result.camera_id.clone(),
            label: result.label.clone(),
            confidence: result.confidence,
            fired_at: result.observed_at,
            snapshot_ref: None,
            delivery: DeliveryStatus::Pending,
        })
    }

    pub fn consecutive_count(&self) -> u32 {
        self.consecutive_count
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn policy(threshold: f32, repeats: u32, cooldown_secs: u64) -> AlertPolicy {
        AlertPolicy {
            confidence_threshold: threshold,
            required_repeats: repeats,
            cooldown: Duration::from_secs(cooldown_secs),
            normal_labels: AlertPolicy::default_normal_labels(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn result(label: &str, confidence: f32, secs: i64) -> ClassificationResult {
        ClassificationResult {
            camera_id: "cam-1".to_string(),
            label: label.to_string(),
            confidence,
            captured_at: at(secs),
            observed_at: at(secs),
        }
    }

    #[test]
    fn test_fires_on_required_repeats() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 2, 8));

        assert!(evaluator.observe(&result("Assault", 0.9, 0)).is_none());
        let event = evaluator.observe(&result("Assault", 0.92, 1));

        let event = event.unwrap();
        assert_eq!(event.label, "Assault");
        assert_eq!(event.camera_id, "cam-1");
        assert_eq!(event.fired_at, at(1));
        assert_eq!(event.delivery, DeliveryStatus::Pending);
    }

    #[test]
    fn test_cooldown_suppresses_then_refires() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 2, 8));

        assert!(evaluator.observe(&result("Assault", 0.9, 0)).is_none());
        assert!(evaluator.observe(&result("Assault", 0.9, 1)).is_some());
        // still inside the 8s window
        assert!(evaluator.observe(&result("Assault", 0.9, 2)).is_none());
        assert!(evaluator.observe(&result("Assault", 0.9, 8)).is_none());
        // count kept running, so one observation past the window fires
        assert!(evaluator.observe(&result("Assault", 0.9, 9)).is_some());
    }

    #[test]
    fn test_normal_label_resets_streak() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 2, 8));

        assert!(evaluator.observe(&result("Assault", 0.9, 0)).is_none());
        assert!(evaluator.observe(&result("Normal", 0.9, 1)).is_none());
        assert_eq!(evaluator.consecutive_count(), 0);
        // streak starts over
        assert!(evaluator.observe(&result("Assault", 0.9, 2)).is_none());
        assert!(evaluator.observe(&result("Assault", 0.9, 3)).is_some());
    }

    #[test]
    fn test_alternating_labels_never_fire() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 2, 8));

        for t in 0..20 {
            let label = if t % 2 == 0 { "Assault" } else { "Normal" };
            assert!(
                evaluator.observe(&result(label, 0.9, t)).is_none(),
                "fired at t={}",
                t
            );
        }
    }

    #[test]
    fn test_low_confidence_resets_streak() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 2, 8));

        assert!(evaluator.observe(&result("Assault", 0.9, 0)).is_none());
        assert!(evaluator.observe(&result("Assault", 0.5, 1)).is_none());
        assert_eq!(evaluator.consecutive_count(), 0);
        assert!(evaluator.observe(&result("Assault", 0.9, 2)).is_none());
    }

    #[test]
    fn test_labels_are_normalized_for_comparison() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 2, 8));

        assert!(evaluator.observe(&result("  ASSAULT ", 0.9, 0)).is_none());
        let event = evaluator.observe(&result("assault", 0.9, 1)).unwrap();
        // the fired event carries the classifier's label, unnormalized
        assert_eq!(event.label, "assault");
    }

    #[test]
    fn test_new_qualifying_label_restarts_streak_at_one() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 3, 8));

        assert!(evaluator.observe(&result("Assault", 0.9, 0)).is_none());
        assert!(evaluator.observe(&result("Assault", 0.9, 1)).is_none());
        assert!(evaluator.observe(&result("Arson", 0.9, 2)).is_none());
        assert_eq!(evaluator.consecutive_count(), 1);
        assert!(evaluator.observe(&result("Arson", 0.9, 3)).is_none());
        assert!(evaluator.observe(&result("Arson", 0.9, 4)).is_some());
    }

    #[test]
    fn test_single_repeat_fires_immediately() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 1, 8));

        assert!(evaluator.observe(&result("Shoplifting", 0.8, 0)).is_some());
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 1, 8));

        // exactly at the threshold qualifies
        assert!(evaluator.observe(&result("Assault", 0.75, 0)).is_some());
    }

    #[test]
    fn test_custom_normal_labels() {
        let mut p = policy(0.5, 1, 8);
        p.normal_labels.insert("loitering".to_string());
        let mut evaluator = AlertEvaluator::new(p);

        assert!(evaluator.observe(&result("Loitering", 0.9, 0)).is_none());
        assert!(evaluator.observe(&result("Assault", 0.9, 1)).is_some());
    }

    #[test]
    fn test_clock_skew_within_cooldown_is_suppressed() {
        let mut evaluator = AlertEvaluator::new(policy(0.75, 1, 8));

        assert!(evaluator.observe(&result("Assault", 0.9, 10)).is_some());
        // observation timestamp going backwards stays inside the window
        assert!(evaluator.observe(&result("Assault", 0.9, 5)).is_none());
    }
}
