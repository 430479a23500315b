//! Encoded polyline algorithm used by the directions provider for step geometry.

use thiserror::Error;

use crate::models::path::GeoPoint;

/// Precision (decimal places) of the provider's step polylines.
pub const PROVIDER_PRECISION: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    #[error("invalid character {byte:#04x} at offset {offset}")]
    InvalidCharacter { byte: u8, offset: usize },

    #[error("polyline ends in the middle of a coordinate")]
    Truncated,

    #[error("coordinate value overflows at offset {offset}")]
    Overflow { offset: usize },
}

pub fn decode_polyline(encoded: &str, precision: u32) -> Result<Vec<GeoPoint>, PolylineError> {
    let factor = 10_f64.powi(precision as i32);
    let bytes = encoded.as_bytes();
    let mut offset = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();

    while offset < bytes.len() {
        lat += next_delta(bytes, &mut offset)?;
        lng += next_delta(bytes, &mut offset)?;
        points.push(GeoPoint {
            lat: lat as f64 / factor,
            lng: lng as f64 / factor,
        });
    }

    Ok(points)
}

fn next_delta(bytes: &[u8], offset: &mut usize) -> Result<i64, PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0;

    loop {
        let byte = *bytes.get(*offset).ok_or(PolylineError::Truncated)?;
        if !(63..=126).contains(&byte) {
            return Err(PolylineError::InvalidCharacter {
                byte,
                offset: *offset,
            });
        }
        if shift > 60 {
            return Err(PolylineError::Overflow { offset: *offset });
        }

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        *offset += 1;

        if chunk < 0x20 {
            break;
        }
    }

    if result & 1 == 1 {
        Ok(!(result >> 1))
    } else {
        Ok(result >> 1)
    }
}

pub fn encode_polyline(points: &[GeoPoint], precision: u32) -> String {
    let factor = 10_f64.powi(precision as i32);
    let mut encoded = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for point in points {
        let lat = (point.lat * factor).round() as i64;
        let lng = (point.lng * factor).round() as i64;
        push_delta(&mut encoded, lat - prev_lat);
        push_delta(&mut encoded, lng - prev_lng);
        prev_lat = lat;
        prev_lng = lng;
    }

    encoded
}

fn push_delta(out: &mut String, delta: i64) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };

    while value >= 0x20 {
        out.push(char::from((0x20 | (value & 0x1f)) as u8 + 63));
        value >>= 5;
    }
    out.push(char::from(value as u8 + 63));
}

#[cfg(test)]
mod tests {
    use super::{PROVIDER_PRECISION, PolylineError, decode_polyline, encode_polyline};
    use crate::models::path::GeoPoint;

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    #[test]
    fn decodes_reference_polyline() {
        let points = decode_polyline(REFERENCE, PROVIDER_PRECISION).unwrap();

        let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];
        assert_eq!(points.len(), expected.len());
        for (point, (lat, lng)) in points.iter().zip(expected) {
            assert!((point.lat - lat).abs() < 1e-9);
            assert!((point.lng - lng).abs() < 1e-9);
        }
    }

    #[test]
    fn encodes_reference_polyline() {
        let points = [
            GeoPoint::new(38.5, -120.2),
            GeoPoint::new(40.7, -120.95),
            GeoPoint::new(43.252, -126.453),
        ];
        assert_eq!(encode_polyline(&points, PROVIDER_PRECISION), REFERENCE);
    }

    #[test]
    fn empty_polyline_is_empty_path() {
        assert!(decode_polyline("", PROVIDER_PRECISION).unwrap().is_empty());
    }

    #[test]
    fn truncated_polyline_is_rejected() {
        // latitude only, longitude missing
        assert_eq!(
            decode_polyline("_p~iF", PROVIDER_PRECISION),
            Err(PolylineError::Truncated)
        );
    }

    #[test]
    fn out_of_alphabet_character_is_rejected() {
        assert!(matches!(
            decode_polyline("_p~iF ps|U", PROVIDER_PRECISION),
            Err(PolylineError::InvalidCharacter { byte: b' ', .. })
        ));
    }
}
