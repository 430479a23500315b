//! Conversion between in-memory paths and their persisted form.
//!
//! A stored path is an ordered list of strings, one per point, each holding
//! the latitude and longitude joined by a single `-`. A leading `-` belongs to
//! the latitude's sign, so `"-33.8688--151.2093"` is a valid record.

pub mod polyline;

use thiserror::Error;

use crate::models::path::GeoPoint;

const SEPARATOR: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("missing separator")]
    MissingSeparator,

    #[error("coordinate is not a finite number")]
    InvalidNumber,

    #[error("coordinate out of range")]
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {index} ({record:?}): {reason}")]
pub struct PathDecodeError {
    pub index: usize,
    pub record: String,
    pub reason: DecodeFailure,
}

pub fn encode(points: &[GeoPoint]) -> Vec<String> {
    points.iter().map(encode_point).collect()
}

/// `f64`'s `Display` never switches to exponent notation and prints the
/// shortest decimal that parses back to the same value.
pub fn encode_point(point: &GeoPoint) -> String {
    format!("{}{SEPARATOR}{}", point.lat, point.lng)
}

pub fn decode<S: AsRef<str>>(records: &[S]) -> Result<Vec<GeoPoint>, PathDecodeError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let record = record.as_ref();
            decode_point(record).map_err(|reason| PathDecodeError {
                index,
                record: record.to_string(),
                reason,
            })
        })
        .collect()
}

pub fn decode_point(record: &str) -> Result<GeoPoint, DecodeFailure> {
    let split_at = record
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == SEPARATOR)
        .map(|(idx, _)| idx)
        .ok_or(DecodeFailure::MissingSeparator)?;

    let lat = parse_coordinate(&record[..split_at])?;
    let lng = parse_coordinate(&record[split_at + SEPARATOR.len_utf8()..])?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(DecodeFailure::OutOfRange);
    }

    Ok(GeoPoint { lat, lng })
}

fn parse_coordinate(raw: &str) -> Result<f64, DecodeFailure> {
    let value = raw
        .parse::<f64>()
        .map_err(|_| DecodeFailure::InvalidNumber)?;

    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeFailure::InvalidNumber)
    }
}
