//! # Point Matching
//!
//! Matches user-supplied named locations onto the trail catalog.
//!
//! Every trail of the location's park is a candidate, from both sources and
//! regardless of duplicate status. A candidate survives when its planar distance
//! to the point is within the bound; survivors are ranked by a confidence score
//! that blends name similarity and proximity.
//!
//! ## Algorithm
//!
//! 1. Project the point into the planar CRS
//! 2. Query the R-tree of projected trail envelopes with the point expanded by
//!    the distance bound
//! 3. Compute the exact point-to-segment distance for each hit, drop those
//!    beyond the bound
//! 4. Score: `name_weight * similarity + distance_weight * (1 - d / bound)`
//! 5. Pick the best; ties go to TNM, then the nearer trail, then the smaller id

use std::cmp::Ordering;

use geo::{BoundingRect, Coord, MultiLineString};
use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::{point_to_lines_distance, AlbersEqualArea};
use crate::names::match_similarity;
use crate::{
    CanonicalTrail, HikingLocation, MatchConfig, MatchResult, MatchStatus, Result, TrailSource,
};

/// Confidence of a candidate in [0, 1].
///
/// Strictly increasing in `similarity` and strictly decreasing in `distance_m`
/// while both weights are positive.
pub fn confidence_score(similarity: f64, distance_m: f64, config: &MatchConfig) -> f64 {
    let proximity = 1.0 - distance_m / config.distance_bound_m;
    (config.name_weight * similarity + config.distance_weight * proximity).clamp(0.0, 1.0)
}

/// Planar envelope of one trail for R-tree indexing.
#[derive(Debug, Clone)]
struct TrailEnvelope {
    slot: usize,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl RTreeObject for TrailEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

#[derive(Debug, Clone)]
struct IndexedTrail {
    trail: CanonicalTrail,
    projected: MultiLineString<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    trail: &'a CanonicalTrail,
    similarity: f64,
    distance_m: f64,
    confidence: f64,
}

impl Candidate<'_> {
    /// `Less` means `self` is the better candidate.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then(self.trail.source.cmp(&other.trail.source))
            .then(self.distance_m.total_cmp(&other.distance_m))
            .then_with(|| self.trail.id.cmp(&other.trail.id))
    }
}

/// Summary of a matching run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchingStats {
    pub total: usize,
    pub matched_tnm: usize,
    pub matched_osm: usize,
    pub no_match: usize,
    /// Mean confidence over matched locations
    pub average_confidence: Option<f64>,
    /// Mean distance over matched locations, in meters
    pub average_distance_m: Option<f64>,
}

impl MatchingStats {
    pub fn from_results(results: &[MatchResult]) -> Self {
        let mut stats = MatchingStats {
            total: results.len(),
            ..Default::default()
        };
        let mut confidence_sum = 0.0;
        let mut distance_sum = 0.0;

        for result in results {
            match result.source {
                Some(TrailSource::Tnm) if result.is_matched() => stats.matched_tnm += 1,
                Some(TrailSource::Osm) if result.is_matched() => stats.matched_osm += 1,
                _ => stats.no_match += 1,
            }
            if result.is_matched() {
                confidence_sum += result.confidence_score.unwrap_or(0.0);
                distance_sum += result.min_distance_m.unwrap_or(0.0);
            }
        }

        let matched = stats.matched_tnm + stats.matched_osm;
        if matched > 0 {
            stats.average_confidence = Some(confidence_sum / matched as f64);
            stats.average_distance_m = Some(distance_sum / matched as f64);
        }
        stats
    }

    pub fn matched(&self) -> usize {
        self.matched_tnm + self.matched_osm
    }
}

/// Matches locations against an indexed trail catalog.
pub struct PointMatcher {
    config: MatchConfig,
    projection: AlbersEqualArea,
    trails: Vec<IndexedTrail>,
    index: RTree<TrailEnvelope>,
}

impl PointMatcher {
    /// Index a trail catalog. Trails with empty or unprojectable geometry are
    /// never candidates.
    pub fn new(trails: Vec<CanonicalTrail>, config: MatchConfig) -> Result<Self> {
        let projection = AlbersEqualArea::conus()?;
        let trails: Vec<IndexedTrail> = trails
            .into_iter()
            .map(|trail| {
                let projected = projection.project_lines(&trail.geometry).unwrap_or_else(|e| {
                    warn!("[PointMatcher] Trail {} '{}' not indexed: {}", trail.id, trail.name, e);
                    MultiLineString::new(Vec::new())
                });
                IndexedTrail { trail, projected }
            })
            .collect();

        let envelopes: Vec<TrailEnvelope> = trails
            .iter()
            .enumerate()
            .filter_map(|(slot, t)| {
                let rect = t.projected.bounding_rect()?;
                Some(TrailEnvelope {
                    slot,
                    min_x: rect.min().x,
                    min_y: rect.min().y,
                    max_x: rect.max().x,
                    max_y: rect.max().y,
                })
            })
            .collect();

        debug!(
            "[PointMatcher] Indexed {} trails ({} with geometry)",
            trails.len(),
            envelopes.len()
        );

        Ok(Self {
            config,
            projection,
            trails,
            index: RTree::bulk_load(envelopes),
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    fn candidates(&self, p: Coord<f64>, location: &HikingLocation) -> Vec<Candidate<'_>> {
        let bound = self.config.distance_bound_m;
        let search = AABB::from_corners([p.x - bound, p.y - bound], [p.x + bound, p.y + bound]);

        self.index
            .locate_in_envelope_intersecting(&search)
            .filter_map(|envelope| {
                let indexed = &self.trails[envelope.slot];
                if indexed.trail.park_code != location.park_code {
                    return None;
                }
                let distance_m = point_to_lines_distance(p, &indexed.projected);
                if distance_m > bound {
                    return None;
                }
                let similarity = match_similarity(&location.name, &indexed.trail.name);
                let confidence = confidence_score(similarity, distance_m, &self.config);
                if confidence < self.config.min_confidence {
                    return None;
                }
                Some(Candidate {
                    trail: &indexed.trail,
                    similarity,
                    distance_m,
                    confidence,
                })
            })
            .collect()
    }

    /// Match one location to its best trail.
    pub fn match_location(&self, location: &HikingLocation) -> MatchResult {
        if !location.point().is_valid() {
            warn!(
                "[PointMatcher] Location {} '{}' has invalid coordinates ({}, {})",
                location.id, location.name, location.latitude, location.longitude
            );
            return MatchResult::no_match(location);
        }

        let p = match self.projection.project(&location.point()) {
            Ok(p) => p,
            Err(e) => {
                warn!("[PointMatcher] Location {} '{}': {}", location.id, location.name, e);
                return MatchResult::no_match(location);
            }
        };

        let best = self
            .candidates(p, location)
            .into_iter()
            .min_by(|a, b| a.rank(b));

        match best {
            Some(c) => {
                debug!(
                    "[PointMatcher] {} '{}' -> '{}' ({}) at {:.1} m, confidence {:.3}",
                    location.id,
                    location.name,
                    c.trail.name,
                    c.trail.source,
                    c.distance_m,
                    c.confidence
                );
                MatchResult {
                    location_id: location.id,
                    park_code: location.park_code.clone(),
                    location_name: location.name.clone(),
                    matched_trail_id: Some(c.trail.id.clone()),
                    matched_trail_name: Some(c.trail.name.clone()),
                    source: Some(c.trail.source),
                    name_similarity_score: Some(c.similarity),
                    min_distance_m: Some(c.distance_m),
                    confidence_score: Some(c.confidence),
                    match_status: MatchStatus::Matched,
                }
            }
            None => {
                debug!(
                    "[PointMatcher] {} '{}': no trail within {} m",
                    location.id, location.name, self.config.distance_bound_m
                );
                MatchResult::no_match(location)
            }
        }
    }

    /// Match every location, returning results in location-id order.
    pub fn match_all(&self, locations: &[HikingLocation]) -> (Vec<MatchResult>, MatchingStats) {
        let mut ordered: Vec<&HikingLocation> = locations.iter().collect();
        ordered.sort_by_key(|l| l.id);

        let results: Vec<MatchResult> =
            ordered.into_iter().map(|l| self.match_location(l)).collect();
        let stats = MatchingStats::from_results(&results);

        info!(
            "[PointMatcher] Matched {}/{} locations ({} TNM, {} OSM, {} no match)",
            stats.matched(),
            stats.total,
            stats.matched_tnm,
            stats.matched_osm,
            stats.no_match
        );

        (results, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::trail_id;
    use crate::names::normalize_name;
    use crate::GeoPoint;
    use geo::LineString;

    /// A straight east-west trail whose nearest point to `anchor` is
    /// `offset_m` planar meters due north of it.
    fn trail_near(
        anchor: GeoPoint,
        offset_m: f64,
        source: TrailSource,
        name: &str,
    ) -> CanonicalTrail {
        let albers = AlbersEqualArea::conus().unwrap();
        let p = albers.project(&anchor).unwrap();
        let a = albers
            .unproject(Coord {
                x: p.x - 200.0,
                y: p.y + offset_m,
            })
            .unwrap();
        let b = albers
            .unproject(Coord {
                x: p.x + 200.0,
                y: p.y + offset_m,
            })
            .unwrap();
        let normalized_name = normalize_name(name);
        CanonicalTrail {
            id: trail_id("acad", source, &normalized_name),
            park_code: "acad".to_string(),
            source,
            name: name.to_string(),
            normalized_name,
            geometry: MultiLineString::new(vec![LineString::from(vec![
                (a.longitude, a.latitude),
                (b.longitude, b.latitude),
            ])]),
            length_miles: 0.25,
            fragment_count: 1,
        }
    }

    #[test]
    fn test_confidence_score() {
        let config = MatchConfig::default();
        assert!((confidence_score(1.0, 0.0, &config) - 1.0).abs() < 1e-12);
        assert!((confidence_score(0.0, 100.0, &config)).abs() < 1e-12);
        assert!((confidence_score(0.5, 50.0, &config) - 0.5).abs() < 1e-12);
        assert!(confidence_score(0.5, 10.0, &config) > confidence_score(0.5, 20.0, &config));
        assert!(confidence_score(0.6, 20.0, &config) > confidence_score(0.5, 20.0, &config));
    }

    #[test]
    fn test_tie_prefers_tnm() {
        let anchor = GeoPoint::new(44.3386, -68.2733);
        let trails = vec![
            trail_near(anchor, 30.0, TrailSource::Osm, "Ocean Path"),
            trail_near(anchor, 30.0, TrailSource::Tnm, "Ocean Path"),
        ];
        let matcher = PointMatcher::new(trails, MatchConfig::default()).unwrap();
        let location =
            HikingLocation::new(1, "acad", "Ocean Path", anchor.latitude, anchor.longitude);

        let result = matcher.match_location(&location);
        assert_eq!(result.source, Some(TrailSource::Tnm));
    }

    #[test]
    fn test_other_parks_are_not_candidates() {
        let anchor = GeoPoint::new(44.3386, -68.2733);
        let matcher = PointMatcher::new(
            vec![trail_near(anchor, 5.0, TrailSource::Tnm, "Ocean Path")],
            MatchConfig::default(),
        )
        .unwrap();
        let location =
            HikingLocation::new(1, "olym", "Ocean Path", anchor.latitude, anchor.longitude);
        assert_eq!(matcher.match_location(&location).match_status, MatchStatus::NoMatch);
    }

    #[test]
    fn test_min_confidence_filters_candidates() {
        let anchor = GeoPoint::new(44.3386, -68.2733);
        let config = MatchConfig {
            min_confidence: 0.5,
            ..MatchConfig::default()
        };
        let trails = vec![trail_near(anchor, 90.0, TrailSource::Tnm, "Cadillac")];
        let matcher = PointMatcher::new(trails, config).unwrap();
        let location = HikingLocation::new(1, "acad", "Beehive", anchor.latitude, anchor.longitude);
        assert!(!matcher.match_location(&location).is_matched());
    }

    #[test]
    fn test_stats() {
        let location = HikingLocation::new(3, "acad", "Nowhere", 44.0, -68.0);
        let mut matched = MatchResult::no_match(&location);
        matched.match_status = MatchStatus::Matched;
        matched.source = Some(TrailSource::Osm);
        matched.confidence_score = Some(0.8);
        matched.min_distance_m = Some(20.0);

        let stats = MatchingStats::from_results(&[matched, MatchResult::no_match(&location)]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.matched_osm, 1);
        assert_eq!(stats.no_match, 1);
        assert_eq!(stats.average_confidence, Some(0.8));
        assert_eq!(stats.average_distance_m, Some(20.0));
    }
}
