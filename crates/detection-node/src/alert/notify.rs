//! Notification channels: SMTP email and a JSON webhook.
//!
//! Delivery failures are reported to the dispatcher, which marks the event
//! undelivered. Channels never retry on their own.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde_json::json;
use tracing::info;

use common::alerts::AlertEvent;
use common::contracts::NotificationChannel;
use common::error::SendError;

use crate::config::SmtpConfig;

pub struct EmailChannel {
    smtp: SmtpConfig,
}

impl EmailChannel {
    pub fn new(smtp: SmtpConfig) -> Self {
        Self { smtp }
    }

    fn body(&self, event: &AlertEvent) -> String {
        format!(
            "Camera Alert\n\n\
             Camera: {}\n\
             Classification: {}\n\
             Confidence: {:.2}\n\
             Fired At: {}\n\
             Snapshot: {}\n",
            event.camera_id,
            event.label,
            event.confidence,
            event.fired_at.format("%Y-%m-%d %H:%M:%S UTC"),
            event.snapshot_ref.as_deref().unwrap_or("(none)"),
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), SendError> {
        let mut builder = Message::builder()
            .from(
                self.smtp
                    .from
                    .parse()
                    .map_err(|e| SendError::new("email", format!("bad from address: {}", e)))?,
            )
            .subject(format!(
                "Camera alert: {} on {}",
                event.label, event.camera_id
            ))
            .header(ContentType::TEXT_PLAIN);

        for recipient in &self.smtp.to {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| SendError::new("email", format!("bad recipient: {}", e)))?);
        }

        let email = builder
            .body(self.body(event))
            .map_err(|e| SendError::new("email", e))?;

        let credentials =
            Credentials::new(self.smtp.username.clone(), self.smtp.password.clone());
        let mailer = SmtpTransport::relay(&self.smtp.host)
            .map_err(|e| SendError::new("email", e))?
            .port(self.smtp.port)
            .credentials(credentials)
            .build();

        mailer.send(&email).map_err(|e| SendError::new("email", e))?;

        info!(
            event_id = %event.id,
            camera_id = %event.camera_id,
            recipients = self.smtp.to.len(),
            "alert email sent"
        );
        Ok(())
    }
}

pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), SendError> {
        let payload = json!({
            "event_id": event.id,
            "camera_id": event.camera_id,
            "label": event.label,
            "confidence": event.confidence,
            "fired_at": event.fired_at,
            "snapshot_ref": event.snapshot_ref,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::new("webhook", e))?;

        if !response.status().is_success() {
            return Err(SendError::new(
                "webhook",
                format!("endpoint returned {}", response.status()),
            ));
        }

        info!(event_id = %event.id, camera_id = %event.camera_id, "alert webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::alerts::DeliveryStatus;
    use uuid::Uuid;

    #[test]
    fn test_email_body_contains_event_fields() {
        let channel = EmailChannel::new(SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "pass".to_string(),
            from: "alerts@example.com".to_string(),
            to: vec!["ops@example.com".to_string()],
        });

        let event = AlertEvent {
            id: Uuid::new_v4(),
            camera_id: "cam-7".to_string(),
            label: "Explosion".to_string(),
            confidence: 0.97,
            fired_at: Utc::now(),
            snapshot_ref: Some("cam-7/20260301T120000000_explosion.jpg".to_string()),
            delivery: DeliveryStatus::Pending,
        };

        let body = channel.body(&event);
        assert!(body.contains("cam-7"));
        assert!(body.contains("Explosion"));
        assert!(body.contains("0.97"));
        assert!(body.contains("cam-7/20260301T120000000_explosion.jpg"));
    }

    #[test]
    fn test_channel_names() {
        let webhook = WebhookChannel::new("http://127.0.0.1:9/hook".to_string());
        assert_eq!(webhook.name(), "webhook");
    }
}
