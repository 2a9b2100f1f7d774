//! Pipeline configuration.
//!
//! Every tunable constant of the pipeline lives here with its default. A run
//! validates the whole configuration before touching storage; a bad value is
//! the one fatal error class in the library.

use std::str::FromStr;
use std::time::Duration;

use crate::{Result, TrailError};

/// Configuration for fragment aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    /// Exclusive lower bound of the length sanity band, in miles.
    /// Default: 0.0
    pub min_trail_length_miles: f64,

    /// Exclusive upper bound of the length sanity band, in miles.
    /// Default: 1000.0
    pub max_trail_length_miles: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_trail_length_miles: 0.0,
            max_trail_length_miles: 1000.0,
        }
    }
}

/// Configuration for cross-source deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    /// Trigram similarity above which a TNM/OSM pair is a duplicate.
    /// Default: 0.70
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.70,
        }
    }
}

/// Configuration for point-to-trail matching.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// Candidates farther than this from the point are discarded (planar meters).
    /// Default: 100.0
    pub distance_bound_m: f64,

    /// Weight of name similarity in the confidence score.
    /// Default: 0.6
    pub name_weight: f64,

    /// Weight of proximity in the confidence score.
    /// Default: 0.4
    pub distance_weight: f64,

    /// Candidates below this confidence are never selected. 0.0 disables the check.
    /// Default: 0.0
    pub min_confidence: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            distance_bound_m: 100.0,
            name_weight: 0.6,
            distance_weight: 0.4,
            min_confidence: 0.0,
        }
    }
}

/// Configuration for elevation sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationConfig {
    /// Planar distance between samples, in meters.
    /// Default: 50.0
    pub sample_interval_m: f64,

    /// Mandatory delay between successive oracle calls.
    /// Default: 1s
    pub rate_limit_delay: Duration,

    /// Oracle attempts per point before the point is marked failed.
    /// Default: 3
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each subsequent retry.
    /// Default: 500ms
    pub retry_backoff: Duration,

    /// Fraction of bad points above which the whole profile fails.
    /// Default: 0.10
    pub failure_threshold: f64,

    /// Lowest plausible elevation in meters.
    /// Default: -500.0
    pub min_plausible_elevation_m: f64,

    /// Highest plausible elevation in meters.
    /// Default: 9000.0
    pub max_plausible_elevation_m: f64,

    /// Timeout for a single HTTP oracle request.
    /// Default: 10s
    pub request_timeout: Duration,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            sample_interval_m: 50.0,
            rate_limit_delay: Duration::from_secs(1),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            failure_threshold: 0.10,
            min_plausible_elevation_m: -500.0,
            max_plausible_elevation_m: 9000.0,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    pub aggregation: AggregationConfig,
    pub dedup: DedupConfig,
    pub matching: MatchConfig,
    pub elevation: ElevationConfig,
}

impl PipelineConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let m = &mut self.matching;
        override_with(&lookup, "TRAIL_MATCHING_DISTANCE_THRESHOLD_M", &mut m.distance_bound_m)?;
        override_with(&lookup, "TRAIL_MATCHING_NAME_WEIGHT", &mut m.name_weight)?;
        override_with(&lookup, "TRAIL_MATCHING_DISTANCE_WEIGHT", &mut m.distance_weight)?;
        override_with(&lookup, "TRAIL_MATCHING_CONFIDENCE_THRESHOLD", &mut m.min_confidence)?;

        let e = &mut self.elevation;
        override_with(&lookup, "USGS_ELEVATION_SAMPLE_DISTANCE_M", &mut e.sample_interval_m)?;
        override_with(&lookup, "USGS_ELEVATION_ERROR_THRESHOLD", &mut e.failure_threshold)?;

        let mut delay_secs = self.elevation.rate_limit_delay.as_secs_f64();
        override_with(&lookup, "USGS_ELEVATION_RATE_LIMIT_DELAY", &mut delay_secs)?;
        self.elevation.rate_limit_delay = seconds("USGS_ELEVATION_RATE_LIMIT_DELAY", delay_secs)?;

        let mut timeout_secs = self.elevation.request_timeout.as_secs_f64();
        override_with(&lookup, "USGS_ELEVATION_API_TIMEOUT", &mut timeout_secs)?;
        self.elevation.request_timeout = seconds("USGS_ELEVATION_API_TIMEOUT", timeout_secs)?;

        Ok(())
    }

    /// Check every value before a run starts.
    pub fn validate(&self) -> Result<()> {
        let agg = &self.aggregation;
        if !(agg.min_trail_length_miles >= 0.0
            && agg.max_trail_length_miles.is_finite()
            && agg.max_trail_length_miles > agg.min_trail_length_miles)
        {
            return Err(TrailError::config(format!(
                "invalid trail length band ({}, {})",
                agg.min_trail_length_miles, agg.max_trail_length_miles
            )));
        }

        unit_interval("dedup similarity threshold", self.dedup.similarity_threshold)?;

        let m = &self.matching;
        if !(m.distance_bound_m.is_finite() && m.distance_bound_m > 0.0) {
            return Err(TrailError::config(format!(
                "distance bound must be a positive number of meters, got {}",
                m.distance_bound_m
            )));
        }
        if !(m.name_weight > 0.0 && m.distance_weight > 0.0)
            || (m.name_weight + m.distance_weight - 1.0).abs() > 1e-9
        {
            return Err(TrailError::config(format!(
                "confidence weights must be positive and sum to 1, got {} + {}",
                m.name_weight, m.distance_weight
            )));
        }
        unit_interval("minimum confidence", m.min_confidence)?;

        let e = &self.elevation;
        if !(e.sample_interval_m.is_finite() && e.sample_interval_m > 0.0) {
            return Err(TrailError::config(format!(
                "sample interval must be positive, got {}",
                e.sample_interval_m
            )));
        }
        if e.max_attempts == 0 {
            return Err(TrailError::config("max_attempts must be at least 1"));
        }
        unit_interval("failure threshold", e.failure_threshold)?;
        if e.min_plausible_elevation_m.is_nan()
            || e.max_plausible_elevation_m.is_nan()
            || e.min_plausible_elevation_m >= e.max_plausible_elevation_m
        {
            return Err(TrailError::config(format!(
                "invalid plausible elevation range [{}, {}]",
                e.min_plausible_elevation_m, e.max_plausible_elevation_m
            )));
        }

        Ok(())
    }
}

fn override_with<T, F>(lookup: &F, name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *target = raw.trim().parse().map_err(|_| {
            TrailError::config(format!("{} has unparseable value '{}'", name, raw))
        })?;
    }
    Ok(())
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        TrailError::config(format!("{} must be a non-negative duration, got {}", name, value))
    })
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrailError::config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.matching.distance_bound_m, 100.0);
        assert_eq!(config.elevation.sample_interval_m, 50.0);
        assert_eq!(config.dedup.similarity_threshold, 0.70);
    }

    #[test]
    fn test_missing_distance_bound_is_fatal() {
        let mut config = PipelineConfig::default();
        config.matching.distance_bound_m = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());

        config.matching.distance_bound_m = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = PipelineConfig::default();
        config.matching.name_weight = 0.9;
        assert!(config.validate().is_err());

        config.matching.name_weight = 1.0;
        config.matching.distance_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plausibility_band_rejects_nan_and_inverted() {
        let mut config = PipelineConfig::default();
        config.elevation.max_plausible_elevation_m = f64::NAN;
        assert!(config.validate().is_err());

        config.elevation.max_plausible_elevation_m = -600.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRAIL_MATCHING_DISTANCE_THRESHOLD_M", "150"),
            ("USGS_ELEVATION_RATE_LIMIT_DELAY", "0.25"),
            ("USGS_ELEVATION_SAMPLE_DISTANCE_M", " 25.0 "),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.matching.distance_bound_m, 150.0);
        assert_eq!(config.elevation.rate_limit_delay, Duration::from_millis(250));
        assert_eq!(config.elevation.sample_interval_m, 25.0);
        assert_eq!(config.elevation.max_attempts, 3);
    }

    #[test]
    fn test_unparseable_override() {
        let mut config = PipelineConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "TRAIL_MATCHING_NAME_WEIGHT").then(|| "heavy".to_string())
        });
        assert!(matches!(result, Err(TrailError::Configuration { .. })));
    }
}
