use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParcelStatus {
    Inventory,
    #[serde(rename = "In Delivery")]
    InDelivery,
    Delivered,
}

/// Persisted parcel document. `paths` holds the parcel's own optimal route,
/// encoded one `"<lat>-<lng>"` string per point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub description: String,
    pub status: ParcelStatus,
    pub paths: Vec<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParcel {
    pub origin: String,
    pub destination: String,
    pub description: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParcelUpdate {
    pub status: Option<ParcelStatus>,
    pub paths: Option<Vec<String>>,
}

impl ParcelUpdate {
    pub fn status(status: ParcelStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn paths(paths: Vec<String>) -> Self {
        Self {
            paths: Some(paths),
            ..Self::default()
        }
    }
}

impl Parcel {
    pub fn apply(&mut self, update: ParcelUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(paths) = update.paths {
            self.paths = paths;
        }
        self.updated_at = Utc::now();
    }
}
