//! # Segment Aggregation
//!
//! Merges same-named raw fragments from one source into canonical per-park
//! trails.
//!
//! Sources deliver a single trail as many disconnected pieces. Pieces whose
//! normalized names match exactly are unioned into one multi-line, and the
//! trail length is the sum of the pieces' planar lengths. The reported length
//! carried by a fragment is never used.
//!
//! The output is a pure function of the input set: ids, geometry and length
//! do not depend on the order fragments arrive in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use geo::{LineString, MultiLineString};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::geo_utils::{self, AlbersEqualArea, METERS_PER_MILE};
use crate::names::normalize_name;
use crate::{AggregationConfig, CanonicalTrail, Result, TrailError, TrailFragment, TrailSource};

/// Result of aggregating one (park, source) fragment set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationOutcome {
    /// Canonical trails, sorted by normalized name
    pub trails: Vec<CanonicalTrail>,
    /// Fragments dropped for having no usable name
    pub skipped_unnamed: usize,
    /// Fragments or trails dropped for bad geometry or an out-of-band length
    pub rejected: Vec<TrailError>,
}

/// Deterministic trail identifier.
///
/// First 16 bytes of SHA-256 over the park code, source tag and normalized
/// name, hex encoded.
pub fn trail_id(park_code: &str, source: TrailSource, normalized_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(park_code.as_bytes());
    hasher.update([0x1f]);
    hasher.update(source.tag().as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized_name.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

struct Prepared<'a> {
    fragment: &'a TrailFragment,
    display_name: &'a str,
    length_m: f64,
}

impl Prepared<'_> {
    fn first_coord(&self) -> (f64, f64) {
        self.fragment
            .geometry
            .iter()
            .flat_map(|line| line.coords())
            .next()
            .map(|c| (c.x, c.y))
            .unwrap_or((f64::NAN, f64::NAN))
    }

    fn sort_cmp(&self, other: &Self) -> Ordering {
        let (ax, ay) = self.first_coord();
        let (bx, by) = other.first_coord();
        ax.total_cmp(&bx)
            .then(ay.total_cmp(&by))
            .then_with(|| self.display_name.cmp(other.display_name))
            .then(self.length_m.total_cmp(&other.length_m))
    }
}

/// Merge the fragments of one park and one source into canonical trails.
///
/// Unnamed fragments are counted and skipped. Fragments with bad geometry and
/// trails whose length falls outside the configured band are logged and
/// reported in [`AggregationOutcome::rejected`]; the rest of the batch is kept.
///
/// Fails only when the planar projection cannot be set up.
pub fn aggregate_fragments(
    park_code: &str,
    source: TrailSource,
    fragments: &[TrailFragment],
    config: &AggregationConfig,
) -> Result<AggregationOutcome> {
    let projection = AlbersEqualArea::conus()?;
    let mut outcome = AggregationOutcome::default();
    let mut groups: BTreeMap<String, Vec<Prepared<'_>>> = BTreeMap::new();

    for fragment in fragments {
        if fragment.park_code != park_code || fragment.source != source {
            debug!(
                "[Aggregator] Ignoring {} fragment from {} while aggregating {} {}",
                fragment.source, fragment.park_code, park_code, source
            );
            continue;
        }

        let display_name = match fragment.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                outcome.skipped_unnamed += 1;
                continue;
            }
        };

        let measured = geo_utils::validate_geometry(display_name, &fragment.geometry)
            .and_then(|()| geo_utils::planar_length_m(&projection, &fragment.geometry));
        let length_m = match measured {
            Ok(length_m) => length_m,
            Err(e) => {
                warn!("[Aggregator] {} {}: skipping fragment: {}", park_code, source, e);
                outcome.rejected.push(e);
                continue;
            }
        };

        if let Some(reported) = fragment.reported_length {
            debug!(
                "[Aggregator] '{}': reported length {} ignored, measured {:.1} m",
                display_name, reported, length_m
            );
        }

        groups
            .entry(normalize_name(display_name))
            .or_default()
            .push(Prepared {
                fragment,
                display_name,
                length_m,
            });
    }

    for (normalized_name, mut members) in groups {
        members.sort_by(Prepared::sort_cmp);

        let length_m: f64 = members.iter().map(|p| p.length_m).sum();
        let length_miles = length_m / METERS_PER_MILE;
        let display_name = members[0].display_name.to_string();

        if length_miles <= config.min_trail_length_miles
            || length_miles >= config.max_trail_length_miles
        {
            let err = TrailError::RangeValidation {
                park_code: park_code.to_string(),
                name: display_name,
                length_miles,
                min_miles: config.min_trail_length_miles,
                max_miles: config.max_trail_length_miles,
            };
            warn!("[Aggregator] {}", err);
            outcome.rejected.push(err);
            continue;
        }

        let parts: Vec<LineString<f64>> = members
            .iter()
            .flat_map(|p| p.fragment.geometry.iter().cloned())
            .collect();

        outcome.trails.push(CanonicalTrail {
            id: trail_id(park_code, source, &normalized_name),
            park_code: park_code.to_string(),
            source,
            name: display_name,
            normalized_name,
            geometry: MultiLineString::new(parts),
            length_miles,
            fragment_count: members.len() as u32,
        });
    }

    info!(
        "[Aggregator] {} {}: {} fragments -> {} trails ({} unnamed, {} rejected)",
        park_code,
        source,
        fragments.len(),
        outcome.trails.len(),
        outcome.skipped_unnamed,
        outcome.rejected.len()
    );

    Ok(outcome)
}
