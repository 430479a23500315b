use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::AppError;
use crate::routing::{DirectionsRequest, DirectionsResponse, RoutingProvider, TravelMode, Waypoint};

pub const DEFAULT_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// Directions web service client.
pub struct GoogleDirections {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleDirections {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

fn mode_param(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Driving => "driving",
    }
}

/// `a|b|via:c`: stopovers are plain, pass-through points carry `via:`.
pub fn waypoints_param(waypoints: &[Waypoint]) -> String {
    waypoints
        .iter()
        .map(|waypoint| {
            if waypoint.stopover {
                waypoint.location.clone()
            } else {
                format!("via:{}", waypoint.location)
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[async_trait]
impl RoutingProvider for GoogleDirections {
    async fn route(&self, request: DirectionsRequest) -> Result<DirectionsResponse, AppError> {
        let mut query = vec![
            ("origin", request.origin.clone()),
            ("destination", request.destination.clone()),
            ("mode", mode_param(request.travel_mode).to_string()),
            ("key", self.api_key.clone()),
        ];
        if !request.waypoints.is_empty() {
            query.push(("waypoints", waypoints_param(&request.waypoints)));
        }

        debug!(
            origin = %request.origin,
            destination = %request.destination,
            waypoints = request.waypoints.len(),
            "requesting directions"
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|err| AppError::Routing(format!("directions request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Routing(format!(
                "directions service responded with HTTP {status}"
            )));
        }

        response
            .json::<DirectionsResponse>()
            .await
            .map_err(|err| AppError::Routing(format!("invalid directions payload: {err}")))
    }
}
