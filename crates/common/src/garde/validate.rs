//! Request validation on top of garde.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a request struct, folding every garde violation into one `ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(describe_report(&report)))
}

/// `path: message` pairs joined with `, `; root-level errors carry no path
fn describe_report(report: &Report) -> String {
    let mut parts = Vec::new();
    for (path, error) in report.iter() {
        let path = path.to_string();
        if path.is_empty() {
            parts.push(error.message().to_string());
        } else {
            parts.push(format!("{}: {}", path, error.message()));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[derive(Validate)]
    struct PositionLookup {
        #[garde(length(min = 1))]
        vehicle_id: String,
        #[garde(range(min = -90.0, max = 90.0))]
        latitude: f64,
    }

    #[test]
    fn test_valid_request_passes() {
        let request = PositionLookup {
            vehicle_id: "truck-01".to_string(),
            latitude: -10.7,
        };
        assert!(validate_struct(&request).is_ok());
    }

    #[test]
    fn test_empty_vehicle_id_fails() {
        let request = PositionLookup {
            vehicle_id: String::new(),
            latitude: 0.0,
        };
        let result = validate_struct(&request);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_message_names_every_offending_field() {
        let request = PositionLookup {
            vehicle_id: String::new(),
            latitude: 123.0,
        };
        match validate_struct(&request) {
            Err(DomainError::ValidationError(msg)) => {
                assert!(msg.contains("vehicle_id"));
                assert!(msg.contains("latitude"));
            }
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }
}
