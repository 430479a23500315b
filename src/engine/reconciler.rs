use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::parcel::{ParcelStatus, ParcelUpdate};
use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleUpdate};
use crate::observability::metrics::Metrics;
use crate::store::Repositories;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Progress below 1.0 was written to the vehicle.
    Progressed(f64),
    /// Parcels were marked delivered and the vehicle returned to idle.
    Completed { delivered: Vec<Uuid> },
    /// Nothing to do for an observed record.
    Unchanged,
}

/// Bridges local or observed progress into the shared vehicle and parcel
/// records. Idle -> Delivery happens on dispatch; Delivery -> Idle happens here.
pub struct ProgressReconciler {
    repos: Repositories,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl ProgressReconciler {
    pub fn new(repos: Repositories, retry: RetryPolicy, metrics: Metrics) -> Self {
        Self {
            repos,
            retry,
            metrics,
        }
    }

    /// Applies a new progress fraction for `vehicle_id`.
    ///
    /// Only a vehicle in delivery is touched; anything else is `Unchanged`.
    /// Progress writes are not retried; the next tick carries a newer value.
    /// Completion is retried per the policy because a dropped completion
    /// strands the vehicle in delivery.
    pub async fn apply(&self, vehicle_id: Uuid, progress: f64) -> Result<Reconciled, AppError> {
        self.apply_to(vehicle_id, None, progress).await
    }

    /// Same as [`apply`](Self::apply), but only while the vehicle still
    /// carries `parcels`. A vehicle re-dispatched since is left alone.
    pub async fn apply_assigned(
        &self,
        vehicle_id: Uuid,
        parcels: &[Uuid],
        progress: f64,
    ) -> Result<Reconciled, AppError> {
        self.apply_to(vehicle_id, Some(parcels), progress).await
    }

    async fn apply_to(
        &self,
        vehicle_id: Uuid,
        parcels: Option<&[Uuid]>,
        progress: f64,
    ) -> Result<Reconciled, AppError> {
        let vehicle = self
            .repos
            .vehicles
            .get_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id} not found")))?;

        let reassigned = parcels.is_some_and(|parcels| vehicle.parcels != parcels);
        if vehicle.status != VehicleStatus::Delivery || reassigned {
            debug!(
                vehicle_id = %vehicle_id,
                status = ?vehicle.status,
                reassigned,
                "vehicle no longer on this delivery; progress dropped"
            );
            return Ok(Reconciled::Unchanged);
        }

        if progress >= 1.0 {
            let delivered = self.complete_with_retry(vehicle_id).await?;
            return Ok(Reconciled::Completed { delivered });
        }

        match self
            .repos
            .vehicles
            .update_vehicle(vehicle_id, VehicleUpdate::progress(progress.max(0.0)))
            .await
        {
            Ok(_) => {
                self.metrics
                    .progress_writes_total
                    .with_label_values(&["success"])
                    .inc();
                Ok(Reconciled::Progressed(progress))
            }
            Err(err) => {
                self.metrics
                    .progress_writes_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(vehicle_id = %vehicle_id, progress, error = %err, "progress write failed");
                Err(err.into())
            }
        }
    }

    /// Same rule for a record seen through the store's change feed.
    pub async fn observe(&self, vehicle: &Vehicle) -> Result<Reconciled, AppError> {
        if vehicle.status == VehicleStatus::Delivery && vehicle.delivery_progress >= 1.0 {
            let delivered = self.complete_with_retry(vehicle.id).await?;
            return Ok(Reconciled::Completed { delivered });
        }

        Ok(Reconciled::Unchanged)
    }

    async fn complete_with_retry(&self, vehicle_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.complete(vehicle_id).await {
                Ok(delivered) => {
                    self.metrics
                        .completions_total
                        .with_label_values(&["success"])
                        .inc();
                    info!(
                        vehicle_id = %vehicle_id,
                        parcels = delivered.len(),
                        attempt,
                        "delivery completed"
                    );
                    return Ok(delivered);
                }
                Err(err @ AppError::NotFound(_)) => {
                    self.metrics
                        .completions_total
                        .with_label_values(&["error"])
                        .inc();
                    return Err(err);
                }
                Err(err) if attempt < attempts => {
                    warn!(
                        vehicle_id = %vehicle_id,
                        attempt,
                        error = %err,
                        "completion failed; retrying"
                    );
                    sleep(self.retry.backoff * attempt).await;
                }
                Err(err) => {
                    self.metrics
                        .completions_total
                        .with_label_values(&["error"])
                        .inc();
                    error!(
                        vehicle_id = %vehicle_id,
                        attempts,
                        error = %err,
                        "completion failed; vehicle left in delivery"
                    );
                    return Err(AppError::CompletionFailed {
                        vehicle_id,
                        attempts,
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    /// Parcels are marked delivered before the vehicle is reset, so a partial
    /// failure leaves a vehicle still in delivery rather than an idle vehicle
    /// with undelivered parcels. Re-running it is harmless.
    async fn complete(&self, vehicle_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let vehicle = self
            .repos
            .vehicles
            .get_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id} not found")))?;

        if vehicle.is_idle() {
            return Ok(Vec::new());
        }

        for parcel_id in &vehicle.parcels {
            self.repos
                .parcels
                .update_parcel(*parcel_id, ParcelUpdate::status(ParcelStatus::Delivered))
                .await?;
        }

        self.repos
            .vehicles
            .update_vehicle(vehicle_id, VehicleUpdate::reset_idle())
            .await?;

        Ok(vehicle.parcels)
    }
}
