use std::collections::HashSet;

use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec;
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::models::parcel::{NewParcel, Parcel, ParcelStatus, ParcelUpdate};
use crate::models::vehicle::{NewVehicle, Vehicle, VehicleStatus, VehicleUpdate};
use crate::routing::acquisition::{RouteAcquirer, RouteTarget};
use crate::routing::stops::RouteStops;
use crate::store::Repositories;

pub fn validate_new_parcel(draft: &NewParcel) -> Result<(), AppError> {
    if draft.origin.trim().is_empty() || draft.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "origin and destination are required".to_string(),
        ));
    }
    if draft.description.trim().is_empty() {
        return Err(AppError::BadRequest("description is required".to_string()));
    }
    Ok(())
}

/// Creates the parcel in inventory. Its own route is acquired afterwards by
/// [`acquire_parcel_route`].
pub async fn intake_parcel(repos: &Repositories, draft: NewParcel) -> Result<Parcel, AppError> {
    validate_new_parcel(&draft)?;
    let parcel = repos.parcels.create_parcel(draft).await?;
    info!(parcel_id = %parcel.id, "parcel added");
    Ok(parcel)
}

/// Background half of intake: failures are reported as notifications since
/// nobody is waiting on the request anymore.
pub async fn acquire_parcel_route(
    routes: &RouteAcquirer,
    notifications_tx: &broadcast::Sender<Notification>,
    parcel: &Parcel,
) {
    let notification = match routes
        .acquire_for(RouteTarget::Parcel(parcel.id), &RouteStops::single(parcel))
        .await
    {
        Ok(_) => Notification::info(format!("optimal route updated for parcel {}", parcel.id)),
        Err(err) => {
            warn!(parcel_id = %parcel.id, error = %err, "parcel route not stored");
            Notification::error(format!(
                "could not get optimal route for parcel {}: {err}",
                parcel.id
            ))
        }
    };

    let _ = notifications_tx.send(notification);
}

/// Loads the selected parcels in selection order, rejecting duplicates,
/// unknown ids and parcels that are not in inventory.
async fn load_inventory_parcels(
    repos: &Repositories,
    parcel_ids: &[Uuid],
) -> Result<Vec<Parcel>, AppError> {
    let mut seen = HashSet::with_capacity(parcel_ids.len());
    let mut parcels = Vec::with_capacity(parcel_ids.len());

    for id in parcel_ids {
        if !seen.insert(*id) {
            return Err(AppError::BadRequest(format!("parcel {id} selected twice")));
        }

        let parcel = repos
            .parcels
            .get_parcel(*id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;

        if parcel.status != ParcelStatus::Inventory {
            return Err(AppError::Conflict(format!(
                "parcel {id} is not in inventory"
            )));
        }
        parcels.push(parcel);
    }

    Ok(parcels)
}

/// Sends inventory parcels to delivery on one vehicle.
///
/// The consolidated route is acquired first; nothing is written if that
/// fails. The first idle vehicle is reused, otherwise a new one is created.
/// Parcels move to "In Delivery" after the vehicle holds them.
pub async fn send_to_delivery(
    repos: &Repositories,
    routes: &RouteAcquirer,
    parcel_ids: &[Uuid],
) -> Result<Vehicle, AppError> {
    let _guard = routes.claim(parcel_ids)?;

    let parcels = load_inventory_parcels(repos, parcel_ids).await?;
    let stops = RouteStops::for_parcels(&parcels)?;
    let path = routes.acquire(&stops).await?;
    let paths = codec::encode(&path);
    let assigned: Vec<Uuid> = parcels.iter().map(|parcel| parcel.id).collect();

    let idle = repos.vehicles.find_idle_vehicles().await?;
    let vehicle = match idle.first() {
        Some(vehicle) => {
            repos
                .vehicles
                .update_vehicle(
                    vehicle.id,
                    VehicleUpdate::start_delivery(assigned.clone(), paths),
                )
                .await?
        }
        None => {
            repos
                .vehicles
                .create_vehicle(NewVehicle {
                    parcels: assigned.clone(),
                    status: VehicleStatus::Delivery,
                    delivery_progress: 0.0,
                    paths,
                })
                .await?
        }
    };

    change_parcels_status(repos, &assigned, ParcelStatus::InDelivery).await?;

    info!(
        vehicle_id = %vehicle.id,
        parcels = assigned.len(),
        points = path.len(),
        "parcels sent to delivery"
    );

    Ok(vehicle)
}

/// Re-acquires the consolidated route of a vehicle in delivery from its
/// parcels in assignment order. Progress is kept.
pub async fn reroute_vehicle(
    repos: &Repositories,
    routes: &RouteAcquirer,
    vehicle_id: Uuid,
) -> Result<Vehicle, AppError> {
    let vehicle = repos
        .vehicles
        .get_vehicle(vehicle_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id} not found")))?;
    if vehicle.status != VehicleStatus::Delivery {
        return Err(AppError::Conflict(format!(
            "vehicle {vehicle_id} is not in delivery"
        )));
    }

    let mut parcels = Vec::with_capacity(vehicle.parcels.len());
    for id in &vehicle.parcels {
        let parcel = repos
            .parcels
            .get_parcel(*id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;
        parcels.push(parcel);
    }

    let stops = RouteStops::for_parcels(&parcels)?;
    routes
        .acquire_for(RouteTarget::Vehicle(vehicle_id), &stops)
        .await?;

    repos
        .vehicles
        .get_vehicle(vehicle_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id} not found")))
}

/// Bulk status change, also used administratively to move parcels back to
/// inventory.
pub async fn change_parcels_status(
    repos: &Repositories,
    parcel_ids: &[Uuid],
    status: ParcelStatus,
) -> Result<Vec<Parcel>, AppError> {
    let mut updated = Vec::with_capacity(parcel_ids.len());
    for id in parcel_ids {
        let parcel = repos
            .parcels
            .update_parcel(*id, ParcelUpdate::status(status))
            .await?;
        updated.push(parcel);
    }
    Ok(updated)
}
