use crate::domain::TelemetryReading;
use chrono::{DateTime, TimeZone, Utc};
use common::domain::{Coordinate, DomainError, DomainResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TrackerPayload {
    device_id: Option<String>,
    location: Option<TrackerLocation>,
}

#[derive(Debug, Deserialize)]
struct TrackerLocation {
    timestamp: Option<TrackerTimestamp>,
    coords: Option<TrackerCoords>,
}

#[derive(Debug, Deserialize)]
struct TrackerCoords {
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,
}

/// RFC 3339 text, or epoch milliseconds from trackers that send numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrackerTimestamp {
    Text(String),
    Millis(i64),
}

impl TrackerTimestamp {
    fn to_utc(&self) -> DomainResult<DateTime<Utc>> {
        match self {
            TrackerTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    DomainError::InvalidTelemetry(format!("bad timestamp {:?}: {}", text, e))
                }),
            TrackerTimestamp::Millis(millis) => Utc
                .timestamp_millis_opt(*millis)
                .single()
                .ok_or_else(|| {
                    DomainError::InvalidTelemetry(format!("bad timestamp {}", millis))
                }),
        }
    }
}

fn missing(field: &str) -> DomainError {
    DomainError::InvalidTelemetry(format!("missing {}", field))
}

/// Decode and validate one frame body.
///
/// Speed defaults to 0 and negative speeds (unknown) are clamped to 0.
pub fn parse_reading(body: &[u8]) -> DomainResult<TelemetryReading> {
    let payload: TrackerPayload = serde_json::from_slice(body)
        .map_err(|e| DomainError::InvalidTelemetry(format!("invalid JSON: {}", e)))?;

    let device_id = payload
        .device_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| missing("device_id"))?;
    let location = payload.location.ok_or_else(|| missing("location"))?;
    let coords = location.coords.ok_or_else(|| missing("location.coords"))?;

    let latitude = coords.latitude.ok_or_else(|| missing("latitude"))?;
    let longitude = coords.longitude.ok_or_else(|| missing("longitude"))?;
    let coordinate = Coordinate::new(latitude, longitude)?;

    let recorded_at = location
        .timestamp
        .ok_or_else(|| missing("location.timestamp"))?
        .to_utc()?;

    let speed = coords.speed.unwrap_or(0.0).max(0.0);

    Ok(TelemetryReading {
        device_id,
        coordinate,
        speed,
        recorded_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_payload() {
        let body = br#"{
            "device_id": "imei-001",
            "location": {
                "timestamp": "2024-06-01T08:00:00.000Z",
                "coords": {"latitude": -10.7146, "longitude": 25.4721, "speed": 12.5}
            }
        }"#;

        let reading = parse_reading(body).unwrap();
        assert_eq!(reading.device_id, "imei-001");
        assert_eq!(reading.coordinate.latitude, -10.7146);
        assert_eq!(reading.speed, 12.5);
        assert_eq!(reading.recorded_at.to_rfc3339(), "2024-06-01T08:00:00+00:00");
    }

    #[test]
    fn test_speed_defaults_and_clamps() {
        let no_speed = br#"{"device_id":"d","location":{"timestamp":"2024-06-01T08:00:00Z","coords":{"latitude":0,"longitude":0}}}"#;
        assert_eq!(parse_reading(no_speed).unwrap().speed, 0.0);

        let negative = br#"{"device_id":"d","location":{"timestamp":"2024-06-01T08:00:00Z","coords":{"latitude":0,"longitude":0,"speed":-1}}}"#;
        assert_eq!(parse_reading(negative).unwrap().speed, 0.0);
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let body = br#"{"device_id":"d","location":{"timestamp":1717228800000,"coords":{"latitude":0,"longitude":0}}}"#;
        assert_eq!(
            parse_reading(body).unwrap().recorded_at.to_rfc3339(),
            "2024-06-01T08:00:00+00:00"
        );
    }

    #[test]
    fn test_rejections() {
        let cases: [&[u8]; 6] = [
            b"not json",
            br#"{"location":{"timestamp":"2024-06-01T08:00:00Z","coords":{"latitude":0,"longitude":0}}}"#,
            br#"{"device_id":"  ","location":{"timestamp":"2024-06-01T08:00:00Z","coords":{"latitude":0,"longitude":0}}}"#,
            br#"{"device_id":"d","location":{"timestamp":"2024-06-01T08:00:00Z","coords":{"longitude":0}}}"#,
            br#"{"device_id":"d","location":{"timestamp":"yesterday","coords":{"latitude":0,"longitude":0}}}"#,
            br#"{"device_id":"d","location":{"timestamp":"2024-06-01T08:00:00Z","coords":{"latitude":91,"longitude":0}}}"#,
        ];
        for body in cases {
            assert!(
                parse_reading(body).is_err(),
                "accepted {}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
