use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Idle,
    Delivery,
}

/// Persisted vehicle document.
///
/// `paths` is the flattened route covering every assigned parcel in
/// assignment order. An idle vehicle has no parcels, no path and zero progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Uuid,
    pub parcels: Vec<Uuid>,
    pub status: VehicleStatus,
    pub delivery_progress: f64,
    pub paths: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub parcels: Vec<Uuid>,
    pub status: VehicleStatus,
    pub delivery_progress: f64,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VehicleUpdate {
    pub parcels: Option<Vec<Uuid>>,
    pub status: Option<VehicleStatus>,
    pub delivery_progress: Option<f64>,
    pub paths: Option<Vec<String>>,
}

impl VehicleUpdate {
    pub fn progress(fraction: f64) -> Self {
        Self {
            delivery_progress: Some(fraction),
            ..Self::default()
        }
    }

    pub fn paths(paths: Vec<String>) -> Self {
        Self {
            paths: Some(paths),
            ..Self::default()
        }
    }

    pub fn start_delivery(parcels: Vec<Uuid>, paths: Vec<String>) -> Self {
        Self {
            parcels: Some(parcels),
            status: Some(VehicleStatus::Delivery),
            delivery_progress: Some(0.0),
            paths: Some(paths),
        }
    }

    pub fn reset_idle() -> Self {
        Self {
            parcels: Some(Vec::new()),
            status: Some(VehicleStatus::Idle),
            delivery_progress: Some(0.0),
            paths: Some(Vec::new()),
        }
    }
}

impl Vehicle {
    pub fn apply(&mut self, update: VehicleUpdate) {
        if let Some(parcels) = update.parcels {
            self.parcels = parcels;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.delivery_progress {
            self.delivery_progress = progress;
        }
        if let Some(paths) = update.paths {
            self.paths = paths;
        }
        self.updated_at = Utc::now();
    }

    pub fn is_idle(&self) -> bool {
        self.status == VehicleStatus::Idle
    }
}
