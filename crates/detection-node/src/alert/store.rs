//! Alert persistence: Postgres when `DATABASE_URL` is configured, an
//! in-memory ring otherwise.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tokio::sync::RwLock;
use uuid::Uuid;

use common::alerts::{AlertEvent, DeliveryStatus};
use common::contracts::AlertStore;
use common::error::StoreError;

/// In-memory store used when no database is configured and in tests.
/// Contents are lost on restart.
#[derive(Default)]
pub struct MemoryAlertStore {
    events: RwLock<Vec<AlertEvent>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn record(&self, event: &AlertEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn update_delivery(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.delivery = status;
        }
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AlertEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.events.read().await.len() as u64)
    }
}

pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and creates the events table when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_events (
                id UUID PRIMARY KEY,
                camera_id TEXT NOT NULL,
                label TEXT NOT NULL,
                confidence REAL NOT NULL,
                fired_at TIMESTAMPTZ NOT NULL,
                snapshot_ref TEXT,
                delivery TEXT NOT NULL DEFAULT 'pending'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_alert_events_fired_at ON alert_events (fired_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    fn map_event_row(row: PgRow) -> Result<AlertEvent, sqlx::Error> {
        use sqlx::Row;
        let delivery: String = row.try_get("delivery")?;
        Ok(AlertEvent {
            id: row.try_get("id")?,
            camera_id: row.try_get("camera_id")?,
            label: row.try_get("label")?,
            confidence: row.try_get("confidence")?,
            fired_at: row.try_get("fired_at")?,
            snapshot_ref: row.try_get("snapshot_ref")?,
            delivery: delivery.parse().unwrap_or(DeliveryStatus::Pending),
        })
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn record(&self, event: &AlertEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alert_events (id, camera_id, label, confidence, fired_at, snapshot_ref, delivery)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(&event.camera_id)
        .bind(&event.label)
        .bind(event.confidence)
        .bind(event.fired_at)
        .bind(&event.snapshot_ref)
        .bind(event.delivery.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_delivery(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE alert_events SET delivery = $1 WHERE id = $2")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AlertEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, camera_id, label, confidence, fired_at, snapshot_ref, delivery \
             FROM alert_events ORDER BY fired_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| Self::map_event_row(row).map_err(db_err))
            .collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        use sqlx::Row;
        let row = sqlx::query("SELECT COUNT(*) AS count FROM alert_events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let count: i64 = row.try_get("count").map_err(db_err)?;
        Ok(count as u64)
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(label: &str) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            camera_id: "cam-1".to_string(),
            label: label.to_string(),
            confidence: 0.9,
            fired_at: Utc::now(),
            snapshot_ref: None,
            delivery: DeliveryStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_memory_store_records_and_counts() {
        let store = MemoryAlertStore::new();
        store.record(&event("Assault")).await.unwrap();
        store.record(&event("Arson")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_recent_is_newest_first() {
        let store = MemoryAlertStore::new();
        store.record(&event("First")).await.unwrap();
        store.record(&event("Second")).await.unwrap();
        store.record(&event("Third")).await.unwrap();

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].label, "Third");
        assert_eq!(recent[1].label, "Second");
    }

    #[tokio::test]
    async fn test_memory_store_updates_delivery() {
        let store = MemoryAlertStore::new();
        let evt = event("Assault");
        store.record(&evt).await.unwrap();

        store
            .update_delivery(evt.id, DeliveryStatus::Delivered)
            .await
            .unwrap();

        let recent = store.recent(1).await.unwrap();
        assert_eq!(recent[0].delivery, DeliveryStatus::Delivered);

        // unknown ids are a no-op
        store
            .update_delivery(Uuid::new_v4(), DeliveryStatus::Failed)
            .await
            .unwrap();
    }
}
