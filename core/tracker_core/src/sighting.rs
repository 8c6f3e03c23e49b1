use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::relative_time::LastSeen;

/// Latitude/longitude pair. Expected within -90..90 and -180..180, but only
/// numeric parseability is enforced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One reported observation of the pet. Replaced wholesale, never edited.
#[derive(Clone, Debug, PartialEq)]
pub struct Sighting {
    pub coordinates: Coordinates,
    /// Display string exactly as the endpoint returned it.
    pub observed_at: Option<String>,
    pub observed_instant: Option<DateTime<FixedOffset>>,
}

impl Sighting {
    pub fn new(coordinates: Coordinates, observed_at: impl Into<String>) -> Self {
        Self {
            coordinates,
            observed_at: Some(observed_at.into()),
            observed_instant: None,
        }
    }

    pub fn last_seen(&self) -> LastSeen<'_> {
        if let Some(t) = self.observed_instant {
            return LastSeen::Instant(t);
        }
        match self.observed_at.as_deref() {
            Some(s) if !s.trim().is_empty() => LastSeen::Text(s),
            _ => LastSeen::Absent,
        }
    }
}

/// One read-response cell. Sheet cells come back as numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Text(String),
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Deserialize)]
struct ReadRow {
    #[serde(default)]
    lat: Option<Cell>,
    #[serde(default)]
    lng: Option<Cell>,
    #[serde(default)]
    time: Option<Cell>,
}

/// Body of a read response: `{ "lat": .., "lng": .., "time": .. }`.
///
/// Returns `Ok(None)` for the valid "no sighting yet" shape (either coordinate
/// null, missing or blank) and `Err` when the body is not a JSON object or a
/// coordinate is present but not a number.
pub fn parse_read_response(body: &Value) -> Result<Option<Sighting>, String> {
    if !body.is_object() {
        return Err("expected a JSON object".to_string());
    }
    let row = ReadRow::deserialize(body).map_err(|e| e.to_string())?;

    let lat = coordinate(row.lat, "lat")?;
    let lng = coordinate(row.lng, "lng")?;
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Ok(None);
    };

    let (observed_at, observed_instant) = match row.time {
        Some(Cell::Text(s)) if !s.trim().is_empty() => (Some(s), None),
        // Epoch milliseconds, as a Date value serializes from some scripts.
        Some(Cell::Number(ms)) => (Some(ms.to_string()), instant_from_millis(ms)),
        _ => (None, None),
    };

    Ok(Some(Sighting {
        coordinates: Coordinates { lat, lng },
        observed_at,
        observed_instant,
    }))
}

fn instant_from_millis(ms: f64) -> Option<DateTime<FixedOffset>> {
    let ms = ms.trunc();
    if !ms.is_finite() || ms < i64::MIN as f64 || ms > i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms as i64).map(|t| t.fixed_offset())
}

fn coordinate(cell: Option<Cell>, field: &str) -> Result<Option<f64>, String> {
    let parsed = match cell {
        None => return Ok(None),
        Some(Cell::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(Cell::Number(x)) => Some(x),
        Some(Cell::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Cell::Other(_)) => None,
    };
    match parsed {
        Some(x) if x.is_finite() => Ok(Some(x)),
        _ => Err(format!("{field} is not a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_fields_mean_no_sighting_yet() {
        let body = json!({ "lat": null, "lng": null, "time": null });
        assert_eq!(parse_read_response(&body).unwrap(), None);

        let body = json!({ "lat": "", "lng": "", "time": "" });
        assert_eq!(parse_read_response(&body).unwrap(), None);

        let body = json!({ "lat": 1.5 });
        assert_eq!(parse_read_response(&body).unwrap(), None);
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let body = json!({ "lat": 51.5072, "lng": "-0.1276", "time": "29/07/2025, 18:27:27" });
        let s = parse_read_response(&body).unwrap().unwrap();
        assert_eq!(s.coordinates, Coordinates { lat: 51.5072, lng: -0.1276 });
        assert_eq!(s.observed_at.as_deref(), Some("29/07/2025, 18:27:27"));
        assert!(matches!(s.last_seen(), LastSeen::Text("29/07/2025, 18:27:27")));
    }

    #[test]
    fn numeric_time_is_an_instant() {
        let body = json!({ "lat": 1, "lng": 2, "time": 1_753_813_647_000i64 });
        let s = parse_read_response(&body).unwrap().unwrap();
        match s.last_seen() {
            LastSeen::Instant(t) => assert_eq!(t.timestamp(), 1_753_813_647),
            _ => panic!("expected an instant"),
        }
    }

    #[test]
    fn float_time_is_truncated_to_millis() {
        let body = json!({ "lat": 1, "lng": 2, "time": 1_753_813_647_000.9f64 });
        let s = parse_read_response(&body).unwrap().unwrap();
        match s.last_seen() {
            LastSeen::Instant(t) => assert_eq!(t.timestamp_millis(), 1_753_813_647_000),
            _ => panic!("expected an instant"),
        }

        let body = json!({ "lat": 1, "lng": 2, "time": 1e300 });
        let s = parse_read_response(&body).unwrap().unwrap();
        assert!(matches!(s.last_seen(), LastSeen::Text(_)));
    }

    #[test]
    fn missing_time_is_absent() {
        let body = json!({ "lat": 1, "lng": 2 });
        let s = parse_read_response(&body).unwrap().unwrap();
        assert!(matches!(s.last_seen(), LastSeen::Absent));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_read_response(&json!([1, 2])).is_err());
        assert!(parse_read_response(&json!({ "lat": "north", "lng": 2 })).is_err());
        assert!(parse_read_response(&json!({ "lat": true, "lng": 2 })).is_err());
    }
}
