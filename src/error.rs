//! Unified error handling for the trailmatch library.
//!
//! Per-record problems (bad geometry, out-of-band lengths, oracle failures) are
//! reported with these variants and then absorbed by the batch loops, which turn
//! them into statuses and summary counts. Only [`TrailError::Configuration`] is
//! meant to abort a run.

use thiserror::Error;

/// Unified error type for trailmatch operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrailError {
    /// Empty or invalid fragment geometry, or a failed geometry operation
    #[error("Geometry error for '{context}': {message}")]
    Geometry { context: String, message: String },

    /// Aggregated trail length outside the sanity band
    #[error("Trail '{name}' in {park_code} is {length_miles:.3} mi, expected ({min_miles}, {max_miles})")]
    RangeValidation {
        park_code: String,
        name: String,
        length_miles: f64,
        min_miles: f64,
        max_miles: f64,
    },

    /// Elevation oracle failed at the network/service level
    #[error("{}", format_transport(.message, .status_code))]
    OracleTransport {
        message: String,
        status_code: Option<u16>,
    },

    /// Elevation oracle returned a sentinel or implausible value
    #[error("Oracle returned unusable elevation {value}")]
    OracleData { value: f64 },

    /// Systemic misconfiguration (fatal)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Persistence/storage error
    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

fn format_transport(message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("Oracle transport error ({}): {}", code, message),
        None => format!("Oracle transport error: {}", message),
    }
}

impl TrailError {
    pub fn geometry(context: impl Into<String>, message: impl Into<String>) -> Self {
        TrailError::Geometry {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        TrailError::Configuration {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>, status_code: Option<u16>) -> Self {
        TrailError::OracleTransport {
            message: message.into(),
            status_code,
        }
    }

    /// Whether the error should abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrailError::Configuration { .. })
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrailError {
    fn from(e: rusqlite::Error) -> Self {
        TrailError::Persistence {
            message: e.to_string(),
        }
    }
}

/// Result type alias for trailmatch operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Extension trait for converting Option to TrailError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a geometry error.
    fn ok_or_geometry(self, context: &str, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_geometry(self, context: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::geometry(context, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrailError::RangeValidation {
            park_code: "acad".to_string(),
            name: "Jordan Pond Path".to_string(),
            length_miles: 1200.0,
            min_miles: 0.0,
            max_miles: 1000.0,
        };
        assert!(err.to_string().contains("Jordan Pond Path"));
        assert!(err.to_string().contains("acad"));

        let err = TrailError::transport("connection reset", Some(503));
        assert!(err.to_string().contains("503"));
        let err = TrailError::transport("timed out", None);
        assert_eq!(err.to_string(), "Oracle transport error: timed out");
    }

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(TrailError::config("missing distance bound").is_fatal());
        assert!(!TrailError::OracleData { value: -1_000_000.0 }.is_fatal());
        assert!(!TrailError::geometry("fragment", "empty").is_fatal());
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_geometry("trail-1", "no coordinates");
        assert!(matches!(result, Err(TrailError::Geometry { .. })));
    }
}
