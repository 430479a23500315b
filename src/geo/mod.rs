use crate::models::path::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn path_length_km(path: &[GeoPoint]) -> f64 {
    path.windows(2).map(|pair| haversine_km(&pair[0], &pair[1])).sum()
}

/// Point located `fraction` of the way along the path, measured by distance.
///
/// `fraction` is clamped to `[0, 1]`. Returns `None` for an empty path.
pub fn point_along(path: &[GeoPoint], fraction: f64) -> Option<GeoPoint> {
    let first = *path.first()?;
    let total = path_length_km(path);
    if total <= 0.0 {
        return Some(first);
    }

    let mut remaining = total * fraction.clamp(0.0, 1.0);
    for pair in path.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let segment = haversine_km(from, to);
        if remaining <= segment {
            let t = if segment > 0.0 { remaining / segment } else { 0.0 };
            return Some(GeoPoint {
                lat: from.lat + (to.lat - from.lat) * t,
                lng: from.lng + (to.lng - from.lng) * t,
            });
        }
        remaining -= segment;
    }

    path.last().copied()
}
