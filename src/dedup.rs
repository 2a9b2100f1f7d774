//! # Cross-Source Deduplication
//!
//! TNM and OSM often describe the same physical trail. A TNM/OSM pair from the
//! same park whose normalized names are trigram-similar above the threshold is
//! a duplicate pairing: the TNM trail is preferred and the OSM trail is hidden
//! from the unified catalog. Nothing is deleted; a suppressed trail stays
//! reachable by id.
//!
//! Pairing is one-to-one. Candidate pairs are taken greedily by descending
//! similarity, with ids breaking ties, so the result is deterministic.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::names::trigram_similarity;
use crate::{CanonicalTrail, DedupConfig, TrailSource};

/// Duplicate status of a trail within the unified catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupStatus {
    /// No duplicate in the other source
    Unique,
    /// TNM trail that has an OSM duplicate
    Preferred { duplicate_id: String },
    /// OSM trail hidden in favor of a TNM trail
    Suppressed { preferred_id: String },
}

/// One accepted TNM/OSM duplicate pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePairing {
    pub park_code: String,
    pub tnm_id: String,
    pub osm_id: String,
    pub similarity: f64,
}

/// Outcome of duplicate resolution over a trail set.
#[derive(Debug, Clone, Default)]
pub struct DedupResolution {
    ids: Vec<String>,
    statuses: HashMap<String, DedupStatus>,
    pairings: Vec<DuplicatePairing>,
}

impl DedupResolution {
    /// Status of a trail. Ids not seen during resolution are `Unique`.
    pub fn status_of(&self, id: &str) -> DedupStatus {
        self.statuses.get(id).cloned().unwrap_or(DedupStatus::Unique)
    }

    /// Ids of every trail that is not suppressed, in input order (TNM first).
    pub fn visible_ids(&self) -> Vec<&str> {
        self.ids
            .iter()
            .filter(|id| !matches!(self.statuses.get(*id), Some(DedupStatus::Suppressed { .. })))
            .map(String::as_str)
            .collect()
    }

    /// Accepted pairings, strongest first.
    pub fn pairings(&self) -> &[DuplicatePairing] {
        &self.pairings
    }

    pub fn is_suppressed(&self, id: &str) -> bool {
        matches!(self.statuses.get(id), Some(DedupStatus::Suppressed { .. }))
    }
}

/// Pair TNM trails with their OSM duplicates.
///
/// Only trails from the same park are compared. Similarity must be strictly
/// greater than the configured threshold.
pub fn resolve_duplicates(
    tnm: &[CanonicalTrail],
    osm: &[CanonicalTrail],
    config: &DedupConfig,
) -> DedupResolution {
    let threshold = config.similarity_threshold;
    let mut candidates: Vec<(f64, &CanonicalTrail, &CanonicalTrail)> = Vec::new();
    for t in tnm.iter().filter(|t| t.source == TrailSource::Tnm) {
        for o in osm
            .iter()
            .filter(|o| o.source == TrailSource::Osm && o.park_code == t.park_code)
        {
            let similarity = trigram_similarity(&t.normalized_name, &o.normalized_name);
            if similarity > threshold {
                candidates.push((similarity, t, o));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.id.cmp(&b.1.id))
            .then_with(|| a.2.id.cmp(&b.2.id))
    });

    let mut resolution = DedupResolution {
        ids: tnm.iter().chain(osm.iter()).map(|t| t.id.clone()).collect(),
        ..Default::default()
    };
    let mut taken: HashSet<&str> = HashSet::new();

    for (similarity, t, o) in candidates {
        if taken.contains(t.id.as_str()) || taken.contains(o.id.as_str()) {
            continue;
        }
        taken.insert(t.id.as_str());
        taken.insert(o.id.as_str());

        debug!(
            "[Dedup] {}: '{}' (TNM) preferred over '{}' (OSM), similarity {:.3}",
            t.park_code, t.name, o.name, similarity
        );

        resolution.statuses.insert(
            t.id.clone(),
            DedupStatus::Preferred {
                duplicate_id: o.id.clone(),
            },
        );
        resolution.statuses.insert(
            o.id.clone(),
            DedupStatus::Suppressed {
                preferred_id: t.id.clone(),
            },
        );
        resolution.pairings.push(DuplicatePairing {
            park_code: t.park_code.clone(),
            tnm_id: t.id.clone(),
            osm_id: o.id.clone(),
            similarity,
        });
    }

    resolution
}

/// Filter a stored trail set down to the unified catalog: every TNM trail
/// plus the OSM trails without a TNM duplicate.
pub fn unified_view<'a>(
    trails: &'a [CanonicalTrail],
    config: &DedupConfig,
) -> Vec<&'a CanonicalTrail> {
    let (tnm, osm): (Vec<CanonicalTrail>, Vec<CanonicalTrail>) = trails
        .iter()
        .cloned()
        .partition(|t| t.source == TrailSource::Tnm);
    let resolution = resolve_duplicates(&tnm, &osm, config);

    trails
        .iter()
        .filter(|t| !resolution.is_suppressed(&t.id))
        .collect()
}
