use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::reconciler::{ProgressReconciler, Reconciled};
use crate::engine::simulator::{ProgressSimulator, ProgressTracker};
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::observability::metrics::Metrics;
use crate::store::StoreError;

pub const MAX_SPEED: f64 = 100.0;

/// Exclusive claim on simulating one vehicle. Dropping it stops the timer.
struct Lease {
    id: Uuid,
    speed: Arc<AtomicU64>,
    simulator: ProgressSimulator,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatus {
    pub vehicle_id: Uuid,
    pub speed: f64,
    pub interval_ms: u64,
}

/// At most one progress simulation per vehicle in this process.
///
/// Two processes can still simulate the same vehicle; their progress writes
/// are last-write-wins.
pub struct SimulationRegistry {
    active: Arc<DashMap<Uuid, Lease>>,
    reconciler: Arc<ProgressReconciler>,
    notifications_tx: broadcast::Sender<Notification>,
    metrics: Metrics,
    interval: Duration,
}

pub fn validate_speed(speed: f64) -> Result<f64, AppError> {
    if speed.is_finite() && speed > 0.0 && speed <= MAX_SPEED {
        Ok(speed)
    } else {
        Err(AppError::BadRequest(format!(
            "speed must be in (0, {MAX_SPEED}], got {speed}"
        )))
    }
}

impl SimulationRegistry {
    pub fn new(
        reconciler: Arc<ProgressReconciler>,
        notifications_tx: broadcast::Sender<Notification>,
        metrics: Metrics,
        interval: Duration,
    ) -> Self {
        Self {
            active: Arc::new(DashMap::new()),
            reconciler,
            notifications_tx,
            metrics,
            interval,
        }
    }

    /// Starts simulating from the vehicle's persisted progress.
    pub fn start(&self, vehicle: &Vehicle, speed: f64) -> Result<SimulationStatus, AppError> {
        let speed = validate_speed(speed)?;
        if vehicle.status != VehicleStatus::Delivery {
            return Err(AppError::Conflict(format!(
                "vehicle {} is not in delivery",
                vehicle.id
            )));
        }

        let entry = match self.active.entry(vehicle.id) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "vehicle {} is already being simulated",
                    vehicle.id
                )));
            }
            Entry::Vacant(entry) => entry,
        };

        let lease_id = Uuid::new_v4();
        let shared_speed = Arc::new(AtomicU64::new(speed.to_bits()));
        let mut simulator = ProgressSimulator::new(self.interval);
        let mut handler = self.tick_handler(vehicle, lease_id, shared_speed.clone());
        simulator.start(move || handler.tick());

        entry.insert(Lease {
            id: lease_id,
            speed: shared_speed,
            simulator,
        });
        self.metrics.active_simulations.inc();

        info!(
            vehicle_id = %vehicle.id,
            speed,
            progress = vehicle.delivery_progress,
            "simulation started"
        );

        Ok(SimulationStatus {
            vehicle_id: vehicle.id,
            speed,
            interval_ms: self.interval.as_millis() as u64,
        })
    }

    fn tick_handler(
        &self,
        vehicle: &Vehicle,
        lease_id: Uuid,
        speed: Arc<AtomicU64>,
    ) -> TickHandler {
        TickHandler {
            vehicle_id: vehicle.id,
            parcels: Arc::from(vehicle.parcels.as_slice()),
            lease_id,
            tracker: ProgressTracker::new(vehicle.delivery_progress),
            speed,
            active: self.active.clone(),
            reconciler: self.reconciler.clone(),
            notifications_tx: self.notifications_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn set_speed(&self, vehicle_id: Uuid, speed: f64) -> Result<SimulationStatus, AppError> {
        let speed = validate_speed(speed)?;
        let lease = self.active.get(&vehicle_id).ok_or_else(|| {
            AppError::NotFound(format!("no simulation running for vehicle {vehicle_id}"))
        })?;
        lease.speed.store(speed.to_bits(), Ordering::Relaxed);

        Ok(SimulationStatus {
            vehicle_id,
            speed,
            interval_ms: lease.simulator.interval().as_millis() as u64,
        })
    }

    /// Stops and releases the lease. Returns whether a simulation was running.
    pub fn stop(&self, vehicle_id: Uuid) -> bool {
        match self.active.remove(&vehicle_id) {
            Some((_, mut lease)) => {
                lease.simulator.stop();
                self.metrics.active_simulations.dec();
                info!(vehicle_id = %vehicle_id, "simulation stopped");
                true
            }
            None => false,
        }
    }

    pub fn status(&self, vehicle_id: Uuid) -> Option<SimulationStatus> {
        self.active.get(&vehicle_id).map(|lease| SimulationStatus {
            vehicle_id,
            speed: f64::from_bits(lease.speed.load(Ordering::Relaxed)),
            interval_ms: lease.simulator.interval().as_millis() as u64,
        })
    }

    pub fn is_active(&self, vehicle_id: Uuid) -> bool {
        self.active.contains_key(&vehicle_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// State carried from one tick of a vehicle's simulation to the next.
struct TickHandler {
    vehicle_id: Uuid,
    parcels: Arc<[Uuid]>,
    lease_id: Uuid,
    tracker: ProgressTracker,
    speed: Arc<AtomicU64>,
    active: Arc<DashMap<Uuid, Lease>>,
    reconciler: Arc<ProgressReconciler>,
    notifications_tx: broadcast::Sender<Notification>,
    metrics: Metrics,
}

impl TickHandler {
    fn tick(&mut self) -> BoxFuture<'static, ControlFlow<()>> {
        let progress = self
            .tracker
            .advance(f64::from_bits(self.speed.load(Ordering::Relaxed)));
        let vehicle_id = self.vehicle_id;
        let parcels = self.parcels.clone();
        let lease_id = self.lease_id;
        let active = self.active.clone();
        let reconciler = self.reconciler.clone();
        let notifications_tx = self.notifications_tx.clone();
        let metrics = self.metrics.clone();

        async move {
            let release = || {
                if active
                    .remove_if(&vehicle_id, |_, lease| lease.id == lease_id)
                    .is_some()
                {
                    metrics.active_simulations.dec();
                }
            };

            match reconciler.apply_assigned(vehicle_id, &parcels, progress).await {
                Ok(Reconciled::Completed { delivered }) => {
                    let _ = notifications_tx.send(Notification::info(format!(
                        "vehicle {vehicle_id} delivered {} parcels",
                        delivered.len()
                    )));
                    release();
                    ControlFlow::Break(())
                }
                Ok(Reconciled::Progressed(_)) => ControlFlow::Continue(()),
                Ok(Reconciled::Unchanged) => {
                    info!(vehicle_id = %vehicle_id, "vehicle left this delivery; simulation stopped");
                    release();
                    ControlFlow::Break(())
                }
                Err(AppError::NotFound(_) | AppError::Persistence(StoreError::NotFound { .. })) => {
                    warn!(vehicle_id = %vehicle_id, "vehicle disappeared; simulation stopped");
                    release();
                    ControlFlow::Break(())
                }
                Err(err @ AppError::CompletionFailed { .. }) => {
                    error!(vehicle_id = %vehicle_id, error = %err, "simulation stopped");
                    let _ = notifications_tx.send(Notification::error(err.to_string()));
                    release();
                    ControlFlow::Break(())
                }
                Err(err) => {
                    let _ = notifications_tx.send(Notification::warning(format!(
                        "progress for vehicle {vehicle_id} not saved: {err}"
                    )));
                    ControlFlow::Continue(())
                }
            }
        }
        .boxed()
    }
}
