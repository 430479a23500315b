//! Route acquisition: stop construction, provider calls and route flattening.

pub mod acquisition;
pub mod google;
pub mod stops;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::polyline::{PROVIDER_PRECISION, decode_polyline};
use crate::error::AppError;
use crate::models::path::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waypoint {
    pub location: String,
    pub stopover: bool,
}

impl Waypoint {
    pub fn stopover(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            stopover: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectionsRequest {
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<Waypoint>,
    pub travel_mode: TravelMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectionsStatus {
    Ok,
    NotFound,
    ZeroResults,
    MaxWaypointsExceeded,
    MaxRouteLengthExceeded,
    InvalidRequest,
    OverDailyLimit,
    OverQueryLimit,
    RequestDenied,
    #[serde(other)]
    UnknownError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionsResponse {
    pub status: DirectionsStatus,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub legs: Vec<Leg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub polyline: EncodedPolyline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedPolyline {
    pub points: String,
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(&self, request: DirectionsRequest) -> Result<DirectionsResponse, AppError>;
}

/// Concatenates every step polyline of the first route, legs in order and
/// steps in order within each leg.
pub fn flatten_route(response: &DirectionsResponse) -> Result<Vec<GeoPoint>, AppError> {
    if response.status != DirectionsStatus::Ok {
        return Err(AppError::NoRoute(format!(
            "provider returned {:?}",
            response.status
        )));
    }

    let route = response
        .routes
        .first()
        .ok_or_else(|| AppError::NoRoute("provider returned zero routes".to_string()))?;

    let mut path = Vec::new();
    for (leg_idx, leg) in route.legs.iter().enumerate() {
        for (step_idx, step) in leg.steps.iter().enumerate() {
            let points = decode_polyline(&step.polyline.points, PROVIDER_PRECISION).map_err(|err| {
                AppError::Routing(format!("leg {leg_idx} step {step_idx}: {err}"))
            })?;
            path.extend(points);
        }
    }

    if path.is_empty() {
        return Err(AppError::NoRoute("route has no geometry".to_string()));
    }

    Ok(path)
}
