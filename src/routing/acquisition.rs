use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec;
use crate::error::AppError;
use crate::models::parcel::ParcelUpdate;
use crate::models::path::GeoPoint;
use crate::models::vehicle::VehicleUpdate;
use crate::observability::metrics::Metrics;
use crate::routing::stops::RouteStops;
use crate::routing::{RoutingProvider, flatten_route};
use crate::store::Repositories;

/// Record that receives an acquired path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteTarget {
    Parcel(Uuid),
    Vehicle(Uuid),
}

impl RouteTarget {
    pub fn id(&self) -> Uuid {
        match self {
            RouteTarget::Parcel(id) | RouteTarget::Vehicle(id) => *id,
        }
    }
}

/// Releases claimed record ids when dropped.
pub struct InFlightGuard {
    in_flight: Arc<DashSet<Uuid>>,
    ids: Vec<Uuid>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        for id in &self.ids {
            self.in_flight.remove(id);
        }
    }
}

pub struct RouteAcquirer {
    provider: Arc<dyn RoutingProvider>,
    repos: Repositories,
    in_flight: Arc<DashSet<Uuid>>,
    metrics: Metrics,
}

impl RouteAcquirer {
    pub fn new(provider: Arc<dyn RoutingProvider>, repos: Repositories, metrics: Metrics) -> Self {
        Self {
            provider,
            repos,
            in_flight: Arc::new(DashSet::new()),
            metrics,
        }
    }

    /// Claims every id for the lifetime of the guard. Fails without claiming
    /// anything if one of them already has an acquisition running.
    pub fn claim(&self, ids: &[Uuid]) -> Result<InFlightGuard, AppError> {
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.in_flight.insert(*id) {
                for prev in &claimed {
                    self.in_flight.remove(prev);
                }
                return Err(AppError::Conflict(format!(
                    "route acquisition already running for {id}"
                )));
            }
            claimed.push(*id);
        }

        Ok(InFlightGuard {
            in_flight: self.in_flight.clone(),
            ids: claimed,
        })
    }

    /// Asks the provider for a driving route and flattens it. Writes nothing.
    pub async fn acquire(&self, stops: &RouteStops) -> Result<Vec<GeoPoint>, AppError> {
        let start = Instant::now();
        let result = match self.provider.route(stops.to_request()).await {
            Ok(response) => flatten_route(&response),
            Err(err) => Err(err),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::NoRoute(_)) => "no_route",
            Err(_) => "error",
        };
        self.metrics
            .route_acquisition_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .route_acquisitions_total
            .with_label_values(&[outcome])
            .inc();

        match &result {
            Ok(path) => info!(
                origin = %stops.origin,
                destination = %stops.destination,
                waypoints = stops.waypoints.len(),
                points = path.len(),
                "route acquired"
            ),
            Err(err) => warn!(
                origin = %stops.origin,
                destination = %stops.destination,
                error = %err,
                "route acquisition failed"
            ),
        }

        result
    }

    /// Acquires a route and stores it on `target`. On failure the record is
    /// left untouched.
    pub async fn acquire_for(
        &self,
        target: RouteTarget,
        stops: &RouteStops,
    ) -> Result<Vec<GeoPoint>, AppError> {
        let _guard = self.claim(&[target.id()])?;
        let path = self.acquire(stops).await?;
        let encoded = codec::encode(&path);

        match target {
            RouteTarget::Parcel(id) => {
                self.repos
                    .parcels
                    .update_parcel(id, ParcelUpdate::paths(encoded))
                    .await?;
            }
            RouteTarget::Vehicle(id) => {
                self.repos
                    .vehicles
                    .update_vehicle(id, VehicleUpdate::paths(encoded))
                    .await?;
            }
        }

        info!(target = ?target, points = path.len(), "route stored");
        Ok(path)
    }
}
