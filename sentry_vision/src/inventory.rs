//! Camera inventory collaborator.
//!
//! ## Responsibilities
//!
//! - List the cameras that should currently be monitored (credentials decrypted)
//! - Record status and last-frame time reported by camera workers
//!
//! Status updates come from worker threads, listing from the supervisor.

use crate::error::InventoryError;
use crate::models::{Camera, CameraId, CameraStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub trait Inventory: Send + Sync {
    /// Cameras that should have a running worker.
    fn list_active_cameras(&self) -> Result<Vec<Camera>, InventoryError>;

    /// Records a camera's status; `last_frame_at` refreshes the last-successful-frame time.
    fn update_status(
        &self,
        camera_id: &CameraId,
        status: CameraStatus,
        last_frame_at: Option<DateTime<Utc>>,
    ) -> Result<(), InventoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusEntry {
    pub status: CameraStatus,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Inventory backed by a JSON array of cameras, re-read on every listing.
///
/// Reported statuses live in memory and are overlaid on the listed cameras.
pub struct FileInventory {
    path: PathBuf,
    statuses: Mutex<HashMap<CameraId, StatusEntry>>,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            statuses: Mutex::new(HashMap::new()),
        }
    }
}

impl Inventory for FileInventory {
    fn list_active_cameras(&self) -> Result<Vec<Camera>, InventoryError> {
        let raw = std::fs::read_to_string(&self.path)?;
        let cameras: Vec<Camera> = serde_json::from_str(&raw)?;

        let statuses = self
            .statuses
            .lock()
            .map_err(|_| InventoryError::Unavailable("status table poisoned".into()))?;

        Ok(cameras
            .into_iter()
            .filter(|camera| camera.active)
            .map(|mut camera| {
                if let Some(entry) = statuses.get(&camera.id) {
                    camera.status = entry.status;
                    camera.last_frame_at = entry.last_frame_at.or(camera.last_frame_at);
                }
                camera
            })
            .collect())
    }

    fn update_status(
        &self,
        camera_id: &CameraId,
        status: CameraStatus,
        last_frame_at: Option<DateTime<Utc>>,
    ) -> Result<(), InventoryError> {
        let mut statuses = self
            .statuses
            .lock()
            .map_err(|_| InventoryError::Unavailable("status table poisoned".into()))?;

        let previous = statuses.get(camera_id).map(|entry| entry.status);
        let entry = statuses.entry(camera_id.clone()).or_insert(StatusEntry {
            status,
            last_frame_at: None,
            updated_at: Utc::now(),
        });
        entry.status = status;
        entry.updated_at = Utc::now();
        if last_frame_at.is_some() {
            entry.last_frame_at = last_frame_at;
        }

        // Only transitions are worth a log line; frame refreshes are frequent.
        if previous != Some(status) {
            tracing::info!(
                camera_id = %camera_id,
                from = %previous.unwrap_or_default(),
                to = %status,
                "Camera status changed"
            );
        }
        Ok(())
    }
}
