//! # Trailmatch
//!
//! Canonical trail resolution, point-to-trail matching and elevation profiling
//! for national park trail data.
//!
//! This library provides:
//! - Aggregation of same-named trail fragments into canonical per-park trails
//! - Cross-source deduplication (TNM preferred over OSM)
//! - Matching of user-supplied points to trails with confidence scoring
//! - Fixed-interval elevation profiles backed by a durable coordinate cache
//!
//! ## Features
//!
//! - **`persistence`** (default) - SQLite store, durable elevation cache and batch pipeline
//! - **`http`** - HTTP client for the USGS elevation point query service
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use geo::{LineString, MultiLineString};
//! use trailmatch::{aggregate_fragments, PipelineConfig, TrailFragment, TrailSource};
//!
//! let line = LineString::from(vec![(-68.2530, 44.3210), (-68.2530, 44.3300)]);
//! let fragment = TrailFragment::new(
//!     "acad",
//!     TrailSource::Tnm,
//!     Some("Jordan Pond Path"),
//!     MultiLineString::new(vec![line]),
//! );
//!
//! let config = PipelineConfig::default();
//! let outcome = aggregate_fragments("acad", TrailSource::Tnm, &[fragment], &config.aggregation)?;
//! assert_eq!(outcome.trails.len(), 1);
//! assert!(outcome.trails[0].length_miles > 0.5);
//! # Ok::<(), trailmatch::TrailError>(())
//! ```

use geo::MultiLineString;
use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailError};

// Pipeline configuration (defaults, validation, environment overrides)
pub mod config;
pub use config::{AggregationConfig, DedupConfig, ElevationConfig, MatchConfig, PipelineConfig};

// Projection and planar geometry utilities
pub mod geo_utils;

// Name normalization and similarity scoring
pub mod names;

// Fragment aggregation into canonical trails
pub mod aggregation;
pub use aggregation::{aggregate_fragments, trail_id, AggregationOutcome};

// Cross-source duplicate resolution
pub mod dedup;
pub use dedup::{
    resolve_duplicates, unified_view, DedupResolution, DedupStatus, DuplicatePairing,
};

// Point-to-trail matching
pub mod matching;
pub use matching::{confidence_score, MatchingStats, PointMatcher};

// Elevation sampling, validation and caching
pub mod elevation;
pub use elevation::{
    cache::{CoordinateKey, ElevationCache, MemoryElevationCache},
    oracle::{ElevationOracle, SENTINEL_NO_DATA},
    resample, ElevationSampler, SampledProfile, SamplePoint,
};

// SQLite persistence for trails, matches, profiles and the elevation cache
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::TrailStore;

// Batch orchestration over the store
#[cfg(feature = "persistence")]
pub mod pipeline;
#[cfg(feature = "persistence")]
pub use pipeline::{
    collect_elevations, match_stored_locations, store_trails, CollectionOptions,
    CollectionSummary,
};

// HTTP client for the elevation point query service
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::EpqsOracle;

// ============================================================================
// Core Types
// ============================================================================

/// One of the two independent trail-geometry providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrailSource {
    /// USGS The National Map
    #[serde(rename = "TNM")]
    Tnm,
    /// OpenStreetMap
    #[serde(rename = "OSM")]
    Osm,
}

impl TrailSource {
    /// Short tag used in storage and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            TrailSource::Tnm => "TNM",
            TrailSource::Osm => "OSM",
        }
    }

    /// Parse a source tag (case-insensitive).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "TNM" => Some(TrailSource::Tnm),
            "OSM" => Some(TrailSource::Osm),
            _ => None,
        }
    }
}

impl fmt::Display for TrailSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A geographic coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use trailmatch::GeoPoint;
/// let point = GeoPoint::new(44.3386, -68.2733); // Acadia
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new geographic point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Raw unit of trail geometry from one source, already clipped to the park boundary.
///
/// Geometry is geographic (x = longitude, y = latitude).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailFragment {
    pub park_code: String,
    pub source: TrailSource,
    pub name: Option<String>,
    pub geometry: MultiLineString<f64>,
    /// Length as reported by the source. Units and CRS vary, so it is only logged.
    pub reported_length: Option<f64>,
}

impl TrailFragment {
    pub fn new(
        park_code: &str,
        source: TrailSource,
        name: Option<&str>,
        geometry: MultiLineString<f64>,
    ) -> Self {
        Self {
            park_code: park_code.to_string(),
            source,
            name: name.map(str::to_string),
            geometry,
            reported_length: None,
        }
    }
}

/// One physical trail within one source, for one park.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTrail {
    /// Deterministic identifier derived from park code, source and normalized name
    pub id: String,
    pub park_code: String,
    pub source: TrailSource,
    /// Display name (trimmed original spelling)
    pub name: String,
    pub normalized_name: String,
    /// Merged geographic geometry
    pub geometry: MultiLineString<f64>,
    /// Sum of fragment lengths in the planar projection, in miles
    pub length_miles: f64,
    /// Number of fragments merged into this trail
    pub fragment_count: u32,
}

/// A user-supplied named point location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HikingLocation {
    pub id: i64,
    pub park_code: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl HikingLocation {
    pub fn new(id: i64, park_code: &str, name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            park_code: park_code.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Outcome of matching one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    #[serde(rename = "MATCHED")]
    Matched,
    #[serde(rename = "NO_MATCH")]
    NoMatch,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "MATCHED",
            MatchStatus::NoMatch => "NO_MATCH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MATCHED" => Some(MatchStatus::Matched),
            "NO_MATCH" => Some(MatchStatus::NoMatch),
            _ => None,
        }
    }
}

/// Result of matching a hiking location onto the trail catalog.
///
/// Score fields are `None` exactly when the status is [`MatchStatus::NoMatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub location_id: i64,
    pub park_code: String,
    pub location_name: String,
    pub matched_trail_id: Option<String>,
    pub matched_trail_name: Option<String>,
    pub source: Option<TrailSource>,
    /// Name similarity (0-1)
    pub name_similarity_score: Option<f64>,
    /// Minimum planar distance from the point to the trail, in meters
    pub min_distance_m: Option<f64>,
    /// Combined proximity/name confidence (0-1)
    pub confidence_score: Option<f64>,
    pub match_status: MatchStatus,
}

impl MatchResult {
    /// A result with no matched trail.
    pub fn no_match(location: &HikingLocation) -> Self {
        Self {
            location_id: location.id,
            park_code: location.park_code.clone(),
            location_name: location.name.clone(),
            matched_trail_id: None,
            matched_trail_name: None,
            source: None,
            name_similarity_score: None,
            min_distance_m: None,
            confidence_score: None,
            match_status: MatchStatus::NoMatch,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.match_status == MatchStatus::Matched
    }
}

/// Validation outcome of a single elevation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointStatus {
    /// Plausible elevation reading
    Valid,
    /// Oracle answered with the sentinel or an implausible value
    Missing,
    /// Oracle could not be reached after all retries
    Failed,
}

/// One sample of an elevation profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationPoint {
    pub index: u32,
    /// Distance along the trail in meters
    pub distance_m: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters, `None` when missing or failed
    pub elevation_m: Option<f64>,
    pub status: PointStatus,
}

/// Lifecycle of an elevation profile.
///
/// `NotStarted -> InProgress -> {Complete, Partial, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileState {
    NotStarted,
    InProgress,
    Complete,
    Partial,
    Failed,
}

impl ProfileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileState::NotStarted => "NOT_STARTED",
            ProfileState::InProgress => "IN_PROGRESS",
            ProfileState::Complete => "COMPLETE",
            ProfileState::Partial => "PARTIAL",
            ProfileState::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NOT_STARTED" => Some(ProfileState::NotStarted),
            "IN_PROGRESS" => Some(ProfileState::InProgress),
            "COMPLETE" => Some(ProfileState::Complete),
            "PARTIAL" => Some(ProfileState::Partial),
            "FAILED" => Some(ProfileState::Failed),
            _ => None,
        }
    }

    /// Whether sampling has reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProfileState::Complete | ProfileState::Partial | ProfileState::Failed
        )
    }
}

/// Elevation profile of a matched trail, one-to-one with a MATCHED result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationProfile {
    pub location_id: i64,
    pub park_code: String,
    pub trail_id: String,
    pub trail_name: String,
    pub source: TrailSource,
    pub points: Vec<ElevationPoint>,
    pub collection_status: ProfileState,
    pub total_points: u32,
    pub failed_points: u32,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(44.3386, -68.2733).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(TrailSource::Tnm.tag(), "TNM");
        assert_eq!(TrailSource::from_tag("osm"), Some(TrailSource::Osm));
        assert_eq!(TrailSource::from_tag(" TNM "), Some(TrailSource::Tnm));
        assert_eq!(TrailSource::from_tag("nps"), None);
        assert!(TrailSource::Tnm < TrailSource::Osm);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for state in [
            ProfileState::NotStarted,
            ProfileState::InProgress,
            ProfileState::Complete,
            ProfileState::Partial,
            ProfileState::Failed,
        ] {
            assert_eq!(ProfileState::parse(state.as_str()), Some(state));
        }
        assert_eq!(MatchStatus::parse("NO_MATCH"), Some(MatchStatus::NoMatch));
        assert!(!ProfileState::InProgress.is_terminal());
        assert!(ProfileState::Partial.is_terminal());
    }

    #[test]
    fn test_no_match_has_null_scores() {
        let location = HikingLocation::new(7, "acad", "Beehive", 44.33, -68.18);
        let result = MatchResult::no_match(&location);
        assert!(!result.is_matched());
        assert!(result.confidence_score.is_none());
        assert!(result.min_distance_m.is_none());
        assert!(result.name_similarity_score.is_none());
    }
}
