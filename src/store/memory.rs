use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::parcel::{NewParcel, Parcel, ParcelStatus, ParcelUpdate};
use crate::models::vehicle::{NewVehicle, Vehicle, VehicleUpdate};
use crate::store::{ParcelRepository, StoreError, VehicleRepository};

/// Process-local document store with a realtime vehicle feed.
pub struct MemoryStore {
    parcels: DashMap<Uuid, Parcel>,
    vehicles: DashMap<Uuid, Vehicle>,
    vehicle_events_tx: broadcast::Sender<Vehicle>,
}

impl MemoryStore {
    pub fn new(event_buffer_size: usize) -> Self {
        let (vehicle_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            parcels: DashMap::new(),
            vehicles: DashMap::new(),
            vehicle_events_tx,
        }
    }

    fn publish(&self, vehicle: &Vehicle) {
        let _ = self.vehicle_events_tx.send(vehicle.clone());
    }
}

#[async_trait]
impl ParcelRepository for MemoryStore {
    async fn create_parcel(&self, draft: NewParcel) -> Result<Parcel, StoreError> {
        let now = Utc::now();
        let parcel = Parcel {
            id: Uuid::new_v4(),
            origin: draft.origin,
            destination: draft.destination,
            description: draft.description,
            status: ParcelStatus::Inventory,
            paths: Vec::new(),
            user_id: draft.user_id,
            created_at: now,
            updated_at: now,
        };

        self.parcels.insert(parcel.id, parcel.clone());
        Ok(parcel)
    }

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>, StoreError> {
        Ok(self.parcels.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_parcels(&self) -> Result<Vec<Parcel>, StoreError> {
        let mut parcels: Vec<Parcel> = self
            .parcels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        parcels.sort_by_key(|parcel| parcel.created_at);
        Ok(parcels)
    }

    async fn update_parcel(&self, id: Uuid, update: ParcelUpdate) -> Result<Parcel, StoreError> {
        let mut parcel = self.parcels.get_mut(&id).ok_or(StoreError::NotFound {
            collection: "parcel",
            id,
        })?;

        parcel.apply(update);
        Ok(parcel.clone())
    }
}

#[async_trait]
impl VehicleRepository for MemoryStore {
    async fn create_vehicle(&self, draft: NewVehicle) -> Result<Vehicle, StoreError> {
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            parcels: draft.parcels,
            status: draft.status,
            delivery_progress: draft.delivery_progress,
            paths: draft.paths,
            updated_at: Utc::now(),
        };

        self.vehicles.insert(vehicle.id, vehicle.clone());
        self.publish(&vehicle);
        Ok(vehicle)
    }

    async fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicles.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        vehicles.sort_by_key(|vehicle| vehicle.id);
        Ok(vehicles)
    }

    async fn find_idle_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut idle: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|entry| entry.value().is_idle())
            .map(|entry| entry.value().clone())
            .collect();
        idle.sort_by_key(|vehicle| vehicle.updated_at);
        Ok(idle)
    }

    async fn update_vehicle(
        &self,
        id: Uuid,
        update: VehicleUpdate,
    ) -> Result<Vehicle, StoreError> {
        let updated = {
            let mut vehicle = self.vehicles.get_mut(&id).ok_or(StoreError::NotFound {
                collection: "vehicle",
                id,
            })?;
            vehicle.apply(update);
            vehicle.clone()
        };

        self.publish(&updated);
        Ok(updated)
    }

    fn subscribe_vehicles(&self) -> broadcast::Receiver<Vehicle> {
        self.vehicle_events_tx.subscribe()
    }
}
