use crate::error::AppError;
use crate::models::parcel::Parcel;
use crate::routing::{DirectionsRequest, TravelMode, Waypoint};

/// Origin, destination and interior stopovers of a driving route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStops {
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<Waypoint>,
}

impl RouteStops {
    pub fn single(parcel: &Parcel) -> Self {
        Self {
            origin: parcel.origin.clone(),
            destination: parcel.destination.clone(),
            waypoints: Vec::new(),
        }
    }

    /// Stops visiting every parcel's pickup and drop-off in parcel order.
    ///
    /// The first parcel's origin and the last parcel's destination bound the
    /// route; the first destination, every interior origin/destination pair and
    /// the last origin become stopovers.
    pub fn for_parcels(parcels: &[Parcel]) -> Result<Self, AppError> {
        let (first, last) = match parcels {
            [] => return Err(AppError::BadRequest("no parcels selected".to_string())),
            [only] => return Ok(Self::single(only)),
            [first, .., last] => (first, last),
        };

        let interior = &parcels[1..parcels.len() - 1];
        let mut waypoints = Vec::with_capacity(interior.len() * 2 + 2);
        waypoints.push(Waypoint::stopover(first.destination.clone()));
        for parcel in interior {
            waypoints.push(Waypoint::stopover(parcel.origin.clone()));
            waypoints.push(Waypoint::stopover(parcel.destination.clone()));
        }
        waypoints.push(Waypoint::stopover(last.origin.clone()));

        Ok(Self {
            origin: first.origin.clone(),
            destination: last.destination.clone(),
            waypoints,
        })
    }

    pub fn to_request(&self) -> DirectionsRequest {
        DirectionsRequest {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            waypoints: self.waypoints.clone(),
            travel_mode: TravelMode::Driving,
        }
    }
}
