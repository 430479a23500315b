//! Document store boundary.
//!
//! Components receive repository handles through [`Repositories`] rather than
//! reaching for a shared collection, so the core runs against the in-memory
//! store in tests and against any hosted store that implements the traits.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::models::parcel::{NewParcel, Parcel, ParcelUpdate};
use crate::models::vehicle::{NewVehicle, Vehicle, VehicleUpdate};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{collection} {id} not found")]
    NotFound { collection: &'static str, id: Uuid },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ParcelRepository: Send + Sync {
    async fn create_parcel(&self, draft: NewParcel) -> Result<Parcel, StoreError>;

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>, StoreError>;

    async fn list_parcels(&self) -> Result<Vec<Parcel>, StoreError>;

    async fn update_parcel(&self, id: Uuid, update: ParcelUpdate) -> Result<Parcel, StoreError>;
}

#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn create_vehicle(&self, draft: NewVehicle) -> Result<Vehicle, StoreError>;

    async fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError>;

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;

    async fn find_idle_vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;

    async fn update_vehicle(&self, id: Uuid, update: VehicleUpdate)
    -> Result<Vehicle, StoreError>;

    /// Realtime feed of every vehicle change, delivered after the write lands.
    fn subscribe_vehicles(&self) -> broadcast::Receiver<Vehicle>;
}

#[derive(Clone)]
pub struct Repositories {
    pub parcels: Arc<dyn ParcelRepository>,
    pub vehicles: Arc<dyn VehicleRepository>,
}

impl Repositories {
    pub fn new(parcels: Arc<dyn ParcelRepository>, vehicles: Arc<dyn VehicleRepository>) -> Self {
        Self { parcels, vehicles }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new(1024));
        Self {
            parcels: store.clone(),
            vehicles: store,
        }
    }
}

/// Changes to a single vehicle. Lagged receivers skip ahead; only the latest
/// record matters to a viewer.
pub fn watch_vehicle(
    updates: broadcast::Receiver<Vehicle>,
    id: Uuid,
) -> impl Stream<Item = Vehicle> + Send + 'static {
    BroadcastStream::new(updates).filter_map(move |result| match result {
        Ok(vehicle) if vehicle.id == id => Some(vehicle),
        _ => None,
    })
}
