//! Filesystem snapshot store: one JPEG per fired alert, grouped by camera.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use common::contracts::SnapshotStore;
use common::error::SnapshotError;
use common::frames::Frame;

pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn save(
        &self,
        frame: &Frame,
        label: &str,
        fired_at: DateTime<Utc>,
    ) -> Result<String, SnapshotError> {
        let dir = self.root.join(&frame.camera_id);
        fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "{}_{}.jpg",
            fired_at.format("%Y%m%dT%H%M%S%3f"),
            label_slug(label)
        );
        let path = dir.join(&file_name);
        fs::write(&path, &frame.data).await?;

        debug!(
            camera_id = %frame.camera_id,
            path = %path.display(),
            bytes = frame.data.len(),
            "alert snapshot written"
        );
        Ok(format!("{}/{}", frame.camera_id, file_name))
    }
}

fn label_slug(label: &str) -> String {
    let slug: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "unlabeled".to_string()
    } else {
        slug
    }
}
