use crate::coerce::parse_leading_number;
use crate::data::{Row, Value};
use crate::resolve::resolve_exact;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub lat: f64,
    pub lng: f64,
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) if n.is_finite() => Some(*n),
        Value::Text(s) => parse_leading_number(s),
        _ => None,
    }
}

/// Collect one marker per row that has numeric latitude and longitude.
/// Rows with an unparseable coordinate are skipped; an input without both
/// columns yields no markers.
pub fn extract_markers(rows: &[Row]) -> Vec<Marker> {
    let (Some(lat_key), Some(lng_key)) = (resolve_exact(rows, "latitude"), resolve_exact(rows, "longitude")) else {
        return Vec::new();
    };

    let markers: Vec<Marker> = rows
        .iter()
        .filter_map(|row| {
            let lat = coordinate(row.get(lat_key))?;
            let lng = coordinate(row.get(lng_key))?;
            Some(Marker { lat, lng })
        })
        .collect();

    debug!("extracted {} markers from {} rows", markers.len(), rows.len());
    markers
}
