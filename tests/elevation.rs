//! Elevation sampling integration tests.

mod common;

use common::{
    down_oracle, fast_elevation_config, healthy_oracle, init_logging, north_line, FnOracle, ACADIA,
};
use trailmatch::{
    ElevationCache, ElevationSampler, MemoryElevationCache, PointStatus, ProfileState, TrailError,
    SENTINEL_NO_DATA,
};

#[test]
fn test_kilometer_trail_yields_21_points() {
    init_logging();
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let oracle = healthy_oracle();

    let profile = sampler
        .sample(&north_line(ACADIA, 1000.0), &mut cache, &oracle)
        .expect("sampling");

    assert_eq!(profile.total_points, 21);
    assert_eq!(profile.points.len(), 21);
    assert_eq!(profile.status, ProfileState::Complete);
    assert_eq!(profile.failed_points, 0);
    assert_eq!(profile.oracle_calls, 21);
    assert_eq!(oracle.calls(), 21);

    assert_eq!(profile.points[0].distance_m, 0.0);
    assert_eq!(profile.points[20].distance_m, 1000.0);
    for pair in profile.points.windows(2) {
        assert!(pair[1].index > pair[0].index);
        assert!(pair[1].distance_m > pair[0].distance_m);
    }
}

#[test]
fn test_sentinel_point_is_missing_and_profile_partial() {
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let oracle = FnOracle::new(|call, _, _| {
        if call == 7 {
            Ok(SENTINEL_NO_DATA)
        } else {
            Ok(250.0 + call as f64)
        }
    });

    let profile = sampler
        .sample(&north_line(ACADIA, 1000.0), &mut cache, &oracle)
        .expect("sampling");

    assert_eq!(profile.points[7].elevation_m, None);
    assert_eq!(profile.points[7].status, PointStatus::Missing);
    assert_eq!(profile.points[8].elevation_m, Some(258.0));
    assert_eq!(profile.failed_points, 1);
    assert_eq!(profile.status, ProfileState::Partial);
}

#[test]
fn test_all_sentinel_profile_fails_with_null_elevations() {
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let oracle = FnOracle::new(|_, _, _| Ok(SENTINEL_NO_DATA));

    let profile = sampler
        .sample(&north_line(ACADIA, 200.0), &mut cache, &oracle)
        .expect("sampling");

    assert_eq!(profile.status, ProfileState::Failed);
    assert!(profile.points.iter().all(|p| p.elevation_m.is_none()));
    // sentinel readings are cached so they are never asked for again
    assert_eq!(cache.len().expect("len"), 5);
    let again = sampler
        .sample(&north_line(ACADIA, 200.0), &mut cache, &oracle)
        .expect("sampling");
    assert_eq!(again.oracle_calls, 0);
    assert!(again.points.iter().all(|p| p.elevation_m.is_none()));
}

#[test]
fn test_transport_errors_are_retried() {
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let oracle = FnOracle::new(|call, _, _| {
        if call < 2 {
            Err(TrailError::transport("503 Service Unavailable", Some(503)))
        } else {
            Ok(12.0)
        }
    });

    let profile = sampler
        .sample(&north_line(ACADIA, 100.0), &mut cache, &oracle)
        .expect("sampling");

    assert_eq!(profile.total_points, 3);
    assert_eq!(profile.status, ProfileState::Complete);
    assert_eq!(profile.oracle_calls, 5);
}

#[test]
fn test_exhausted_retries_fail_points_without_caching() {
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let oracle = down_oracle();

    let profile = sampler
        .sample(&north_line(ACADIA, 100.0), &mut cache, &oracle)
        .expect("sampling");

    assert_eq!(oracle.calls(), 9);
    assert!(profile.points.iter().all(|p| p.status == PointStatus::Failed));
    assert_eq!(profile.failed_points, 3);
    assert_eq!(profile.status, ProfileState::Failed);
    assert!(cache.is_empty().expect("is_empty"));
}

#[test]
fn test_resume_only_queries_unresolved_points() {
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let geometry = north_line(ACADIA, 1000.0);

    // outage after the 15th point
    let flaky = FnOracle::new(|call, _, _| {
        if call < 15 {
            Ok(300.0)
        } else {
            Err(TrailError::transport("timed out", None))
        }
    });
    let first = sampler.sample(&geometry, &mut cache, &flaky).expect("sampling");
    assert_eq!(first.status, ProfileState::Failed);
    assert_eq!(first.failed_points, 6);
    assert_eq!(cache.len().expect("len"), 15);

    let oracle = healthy_oracle();
    let second = sampler.sample(&geometry, &mut cache, &oracle).expect("sampling");
    assert_eq!(oracle.calls(), 6);
    assert_eq!(second.cache_hits, 15);
    assert_eq!(second.status, ProfileState::Complete);
}

#[test]
fn test_implausible_readings_are_missing() {
    let mut sampler = ElevationSampler::new(fast_elevation_config()).expect("sampler");
    let mut cache = MemoryElevationCache::new();
    let oracle = FnOracle::new(|call, _, _| match call {
        0 => Ok(-750.0),
        1 => Ok(f64::NAN),
        _ => Ok(48.0),
    });

    let profile = sampler
        .sample(&north_line(ACADIA, 1000.0), &mut cache, &oracle)
        .expect("sampling");

    assert_eq!(profile.points[0].status, PointStatus::Missing);
    assert_eq!(profile.points[1].status, PointStatus::Missing);
    assert_eq!(profile.failed_points, 2);
    assert_eq!(profile.status, ProfileState::Partial);
}
