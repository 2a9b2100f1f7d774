//! Point-elevation oracle contract.

use serde_json::Value;

use crate::{Result, TrailError};

/// Reading the oracle returns where it has no elevation data.
pub const SENTINEL_NO_DATA: f64 = -1_000_000.0;

/// External single-point elevation service.
///
/// `Ok` carries the raw reading in meters, which may be [`SENTINEL_NO_DATA`]
/// or otherwise implausible; validation happens in the sampler. `Err` is a
/// transport-level failure and is retried.
pub trait ElevationOracle {
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64>;
}

impl<T: ElevationOracle + ?Sized> ElevationOracle for &T {
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        (**self).elevation_at(latitude, longitude)
    }
}

impl<T: ElevationOracle + ?Sized> ElevationOracle for Box<T> {
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        (**self).elevation_at(latitude, longitude)
    }
}

/// Extract the reading from an elevation point query response body.
///
/// The `value` field is either a JSON number or a numeric string. A body
/// without a usable `value` is a response-level failure.
pub fn parse_epqs_value(body: &Value) -> Result<f64> {
    let value = body
        .get("value")
        .ok_or_else(|| TrailError::transport("response has no 'value' field", None))?;

    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| TrailError::transport(format!("unrepresentable value {}", n), None)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TrailError::transport(format!("non-numeric value '{}'", s), None)),
        other => Err(TrailError::transport(format!("unexpected value {}", other), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_and_string() {
        assert_eq!(parse_epqs_value(&json!({"value": 142.37})).unwrap(), 142.37);
        assert_eq!(parse_epqs_value(&json!({"value": "88.5"})).unwrap(), 88.5);
        assert_eq!(
            parse_epqs_value(&json!({"value": -1000000})).unwrap(),
            SENTINEL_NO_DATA
        );
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(matches!(
            parse_epqs_value(&json!({"location": {}})),
            Err(TrailError::OracleTransport { .. })
        ));
        assert!(parse_epqs_value(&json!({"value": "n/a"})).is_err());
        assert!(parse_epqs_value(&json!({"value": null})).is_err());
    }
}
