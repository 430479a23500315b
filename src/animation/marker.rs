use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::animation::spring::{Spring, SpringConfig};
use crate::codec::{self, PathDecodeError};
use crate::geo::point_along;
use crate::models::path::{GeoPoint, Path};
use crate::models::vehicle::Vehicle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Marker,
    /// Polyline only, for static inspection.
    #[serde(rename = "path")]
    PathOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerFrame {
    /// Marker offset along the polyline, 0 to 100.
    pub offset_percent: f64,
    pub position: Option<GeoPoint>,
}

/// Smooths discrete progress updates into continuous marker motion.
///
/// Incoming progress only moves the spring's target; rendered offsets come
/// from the spring's current value.
pub struct MarkerAnimator {
    spring: Spring,
    path: Path,
    mode: RenderMode,
}

impl MarkerAnimator {
    pub fn new(config: SpringConfig, path: Path, initial_progress: f64, mode: RenderMode) -> Self {
        Self {
            spring: Spring::new(config, initial_progress.clamp(0.0, 1.0)),
            path,
            mode,
        }
    }

    /// Starts at the vehicle's current progress with its decoded path.
    pub fn for_vehicle(
        config: SpringConfig,
        vehicle: &Vehicle,
        mode: RenderMode,
    ) -> Result<Self, PathDecodeError> {
        let path = codec::decode(&vehicle.paths)?;
        Ok(Self::new(config, path, vehicle.delivery_progress, mode))
    }

    pub fn path(&self) -> &[GeoPoint] {
        &self.path
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn retarget(&mut self, progress: f64) {
        self.spring.set_target(progress.clamp(0.0, 1.0));
    }

    /// Applies a changed vehicle record and reports whether the path changed.
    /// A new path (re-dispatch or reset) snaps the marker instead of sliding
    /// across unrelated geometry. A path that fails to decode is replaced by
    /// an empty one and the error is returned.
    pub fn sync(&mut self, vehicle: &Vehicle) -> Result<bool, PathDecodeError> {
        let progress = vehicle.delivery_progress.clamp(0.0, 1.0);
        let (path, outcome) = match codec::decode(&vehicle.paths) {
            Ok(path) => (path, Ok(())),
            Err(err) => (Vec::new(), Err(err)),
        };

        let changed = path != self.path;
        if changed {
            self.path = path;
            self.spring.jump_to(progress);
        } else {
            self.retarget(progress);
        }
        outcome.map(|()| changed)
    }

    pub fn advance(&mut self, dt: Duration) -> MarkerFrame {
        self.spring.step(dt);
        self.frame()
    }

    pub fn frame(&self) -> MarkerFrame {
        let fraction = self.spring.value().clamp(0.0, 1.0);
        let position = match self.mode {
            RenderMode::Marker => point_along(&self.path, fraction),
            RenderMode::PathOnly => None,
        };

        MarkerFrame {
            offset_percent: fraction * 100.0,
            position,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.spring.is_at_rest()
    }
}
