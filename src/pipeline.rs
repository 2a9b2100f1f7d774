//! # Batch Pipeline
//!
//! Sequential batch runs over a [`TrailStore`]:
//!
//! - [`store_trails`]: aggregate one park/source fragment set and replace it
//! - [`match_stored_locations`]: recompute every match result
//! - [`collect_elevations`]: build or resume elevation profiles for matched locations
//!
//! Each run validates its configuration before touching storage. Per-record
//! problems are logged and counted; only configuration and storage errors
//! abort a run.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{info, warn};

use crate::aggregation::{aggregate_fragments, AggregationOutcome};
use crate::elevation::oracle::ElevationOracle;
use crate::elevation::ElevationSampler;
use crate::matching::{MatchingStats, PointMatcher};
use crate::persistence::TrailStore;
use crate::{
    ElevationProfile, MatchResult, PipelineConfig, ProfileState, Result, TrailFragment, TrailSource,
};

/// Aggregate fragments for one (park, source) and replace the stored set.
pub fn store_trails(
    store: &mut TrailStore,
    park_code: &str,
    source: TrailSource,
    fragments: &[TrailFragment],
    config: &PipelineConfig,
) -> Result<AggregationOutcome> {
    config.validate()?;
    let outcome = aggregate_fragments(park_code, source, fragments, &config.aggregation)?;
    store.replace_trails(park_code, source, &outcome.trails)?;

    let stored = store.list_trails(Some(park_code))?.len();
    let unified = store.list_unified_trails(park_code, &config.dedup)?.len();
    info!(
        "[Pipeline] {}: {} trails stored, {} in the unified catalog ({} OSM duplicates hidden)",
        park_code,
        stored,
        unified,
        stored - unified
    );

    Ok(outcome)
}

/// Match every stored location against every stored trail and replace the
/// stored results.
pub fn match_stored_locations(
    store: &mut TrailStore,
    config: &PipelineConfig,
) -> Result<MatchingStats> {
    config.validate()?;
    let start = Instant::now();

    let trails = store.list_trails(None)?;
    let locations = store.list_locations(None)?;
    let matcher = PointMatcher::new(trails, config.matching.clone())?;
    let (results, stats) = matcher.match_all(&locations);
    store.replace_match_results(&results)?;

    info!(
        "[Pipeline] Matching done in {:.2}s: {} locations, {} TNM, {} OSM, {} no match, \
         avg confidence {}, avg distance {}",
        start.elapsed().as_secs_f64(),
        stats.total,
        stats.matched_tnm,
        stats.matched_osm,
        stats.no_match,
        stats.average_confidence.map_or("-".to_string(), |c| format!("{:.3}", c)),
        stats.average_distance_m.map_or("-".to_string(), |d| format!("{:.1} m", d)),
    );

    Ok(stats)
}

/// Which profiles an elevation run should touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionOptions {
    /// Only these parks (all parks when `None`)
    pub park_codes: Option<Vec<String>>,
    /// Stop after this many parks, in park-code order
    pub park_limit: Option<usize>,
    /// Re-sample profiles that are already complete
    pub force_refresh: bool,
}

/// Counts from one elevation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub parks: usize,
    /// Profiles sampled in this run
    pub processed: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    /// Complete profiles left untouched
    pub skipped: usize,
    pub oracle_calls: u32,
    pub cache_hits: u32,
}

impl CollectionSummary {
    fn record(&mut self, state: ProfileState) {
        self.processed += 1;
        match state {
            ProfileState::Complete => self.complete += 1,
            ProfileState::Partial => self.partial += 1,
            _ => self.failed += 1,
        }
    }
}

fn profile_for(
    result: &MatchResult,
    trail_id: &str,
    trail_name: &str,
    source: TrailSource,
) -> ElevationProfile {
    ElevationProfile {
        location_id: result.location_id,
        park_code: result.park_code.clone(),
        trail_id: trail_id.to_string(),
        trail_name: trail_name.to_string(),
        source,
        points: Vec::new(),
        collection_status: ProfileState::InProgress,
        total_points: 0,
        failed_points: 0,
    }
}

/// Build elevation profiles for every matched location.
///
/// Complete profiles for the same trail are skipped unless
/// `force_refresh` is set; partial, failed and interrupted ones are sampled
/// again. Cached readings are reused either way, so a re-run only queries the
/// oracle for coordinates it never resolved.
pub fn collect_elevations<O>(
    store: &mut TrailStore,
    oracle: &O,
    config: &PipelineConfig,
    options: &CollectionOptions,
) -> Result<CollectionSummary>
where
    O: ElevationOracle + ?Sized,
{
    config.validate()?;
    let start = Instant::now();

    let mut by_park: BTreeMap<String, Vec<MatchResult>> = BTreeMap::new();
    for result in store.list_match_results(None)? {
        if !result.is_matched() {
            continue;
        }
        if let Some(parks) = &options.park_codes {
            if !parks.contains(&result.park_code) {
                continue;
            }
        }
        by_park.entry(result.park_code.clone()).or_default().push(result);
    }

    let park_limit = options.park_limit.unwrap_or(usize::MAX);
    let mut sampler = ElevationSampler::new(config.elevation.clone())?;
    let mut summary = CollectionSummary::default();

    for (park_code, results) in by_park.into_iter().take(park_limit) {
        summary.parks += 1;
        info!("[Pipeline] {}: {} matched locations", park_code, results.len());

        for result in &results {
            let Some(trail_id) = result.matched_trail_id.as_deref() else {
                continue;
            };

            if !options.force_refresh {
                if let Some(existing) = store.get_profile(result.location_id)? {
                    if existing.collection_status == ProfileState::Complete
                        && existing.trail_id == trail_id
                    {
                        summary.skipped += 1;
                        continue;
                    }
                }
            }

            let Some(trail) = store.get_trail(trail_id)? else {
                warn!(
                    "[Pipeline] Location {} matched unknown trail {}",
                    result.location_id, trail_id
                );
                let name = result.matched_trail_name.as_deref().unwrap_or_default();
                let source = result.source.unwrap_or(TrailSource::Tnm);
                let mut profile = profile_for(result, trail_id, name, source);
                profile.collection_status = ProfileState::Failed;
                store.save_profile(&profile)?;
                summary.record(ProfileState::Failed);
                continue;
            };

            let mut profile = profile_for(result, &trail.id, &trail.name, trail.source);
            store.save_profile(&profile)?;

            let sampled = sampler.sample(&trail.geometry, &mut *store, oracle)?;
            summary.oracle_calls += sampled.oracle_calls;
            summary.cache_hits += sampled.cache_hits;

            profile.points = sampled.points;
            profile.collection_status = sampled.status;
            profile.total_points = sampled.total_points;
            profile.failed_points = sampled.failed_points;
            store.save_profile(&profile)?;
            summary.record(sampled.status);

            info!(
                "[Pipeline] {} '{}' -> {} ({} points, {} bad)",
                result.location_id,
                trail.name,
                sampled.status.as_str(),
                sampled.total_points,
                sampled.failed_points
            );
        }
    }

    info!(
        "[Pipeline] Elevation run done in {:.2}s: {} parks, {} processed ({} complete, \
         {} partial, {} failed), {} skipped, {} oracle calls, {} cache hits",
        start.elapsed().as_secs_f64(),
        summary.parks,
        summary.processed,
        summary.complete,
        summary.partial,
        summary.failed,
        summary.skipped,
        summary.oracle_calls,
        summary.cache_hits
    );

    Ok(summary)
}
