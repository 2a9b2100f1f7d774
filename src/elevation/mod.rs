//! # Elevation Sampling
//!
//! Builds validated elevation profiles for matched trails.
//!
//! ## Algorithm
//!
//! 1. Resample the trail at a fixed planar interval, walking the parts in order
//!    as one path. The trailing partial interval is dropped.
//! 2. For each sample, consult the [`ElevationCache`]. A miss becomes a
//!    rate-limited oracle call, retried with exponential backoff on transport
//!    errors. Every reading the oracle returns is cached, sentinel included.
//! 3. Validate in three stages:
//!
//! | Stage | Condition | Outcome |
//! |-------|-----------|---------|
//! | Response | transport error after all attempts | point `Failed` |
//! | Point | sentinel, non-finite, or outside the plausible range | point `Missing` |
//! | Profile | no points, all bad, or bad fraction above threshold | profile `Failed` |
//!
//! A profile with some bad points under the threshold is `Partial`.

pub mod cache;
pub mod oracle;

use std::time::{Duration, Instant};

use geo::{Coord, MultiLineString};
use log::{debug, warn};

use crate::geo_utils::AlbersEqualArea;
use crate::{
    ElevationConfig, ElevationPoint, GeoPoint, PointStatus, ProfileState, Result, TrailError,
};

use cache::{CoordinateKey, ElevationCache};
use oracle::{ElevationOracle, SENTINEL_NO_DATA};

/// Slack for projection round-off when deciding whether the last interval fits.
const LENGTH_TOLERANCE_M: f64 = 1e-3;

/// A resampled position along a trail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub index: u32,
    /// Planar distance from the start of the path, in meters
    pub distance_m: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Resample a geographic multi-line every `interval_m` planar meters.
///
/// Samples sit at `0, interval, 2 * interval, ...` up to
/// `floor(length / interval) * interval`. Parts are walked in stored order; the
/// gap between the end of one part and the start of the next is not counted.
/// Returns nothing for geometry without coordinates or a non-positive interval.
pub fn resample(
    projection: &AlbersEqualArea,
    geometry: &MultiLineString<f64>,
    interval_m: f64,
) -> Result<Vec<SamplePoint>> {
    if interval_m.is_nan() || interval_m <= 0.0 {
        return Ok(Vec::new());
    }

    let projected = projection.project_lines(geometry)?;

    let Some(first) = projected.iter().flat_map(|l| l.coords()).next().copied() else {
        return Ok(Vec::new());
    };
    let last = projected
        .iter()
        .flat_map(|l| l.coords())
        .last()
        .copied()
        .unwrap_or(first);

    let segments: Vec<(Coord<f64>, Coord<f64>, f64)> = projected
        .iter()
        .flat_map(|l| l.lines())
        .map(|s| (s.start, s.end, s.dx().hypot(s.dy())))
        .collect();
    let total: f64 = segments.iter().map(|s| s.2).sum();
    let count = ((total + LENGTH_TOLERANCE_M) / interval_m).floor() as u32;

    let mut samples = Vec::with_capacity(count as usize + 1);
    let mut seg_idx = 0;
    let mut seg_start = 0.0;

    for index in 0..=count {
        let target = index as f64 * interval_m;
        while seg_idx < segments.len() && seg_start + segments[seg_idx].2 < target {
            seg_start += segments[seg_idx].2;
            seg_idx += 1;
        }

        let position = match segments.get(seg_idx) {
            Some(&(start, end, len)) if len > 0.0 => {
                let t = ((target - seg_start) / len).clamp(0.0, 1.0);
                Coord {
                    x: start.x + t * (end.x - start.x),
                    y: start.y + t * (end.y - start.y),
                }
            }
            Some(&(start, _, _)) => start,
            None if index == 0 => first,
            None => last,
        };

        let GeoPoint {
            latitude,
            longitude,
        } = projection.unproject(position)?;
        samples.push(SamplePoint {
            index,
            distance_m: target,
            latitude,
            longitude,
        });
    }

    Ok(samples)
}

/// Check a raw oracle reading.
///
/// The sentinel, non-finite readings and readings outside the plausible range
/// are data errors: the point is missing, and asking again would not help.
pub fn validate_reading(reading: f64, config: &ElevationConfig) -> Result<f64> {
    if reading == SENTINEL_NO_DATA
        || !reading.is_finite()
        || reading < config.min_plausible_elevation_m
        || reading > config.max_plausible_elevation_m
    {
        Err(TrailError::OracleData { value: reading })
    } else {
        Ok(reading)
    }
}

/// Final status of a profile from its point counts.
pub fn classify_profile(
    total_points: u32,
    bad_points: u32,
    failure_threshold: f64,
) -> ProfileState {
    if total_points == 0 || bad_points >= total_points {
        ProfileState::Failed
    } else if bad_points as f64 / total_points as f64 > failure_threshold {
        ProfileState::Failed
    } else if bad_points > 0 {
        ProfileState::Partial
    } else {
        ProfileState::Complete
    }
}

/// Enforces a minimum delay between successive oracle calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Block until the next call is allowed, then record it.
    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                debug!("[ElevationSampler] Rate limit: waiting {:?}", remaining);
                std::thread::sleep(remaining);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Outcome of sampling one trail.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledProfile {
    pub points: Vec<ElevationPoint>,
    pub status: ProfileState,
    pub total_points: u32,
    /// Missing plus failed points
    pub failed_points: u32,
    /// Oracle requests issued, retries included
    pub oracle_calls: u32,
    pub cache_hits: u32,
}

/// Samples trail geometry against an elevation oracle through a cache.
#[derive(Debug)]
pub struct ElevationSampler {
    config: ElevationConfig,
    limiter: RateLimiter,
    projection: AlbersEqualArea,
}

impl ElevationSampler {
    pub fn new(config: ElevationConfig) -> Result<Self> {
        let limiter = RateLimiter::new(config.rate_limit_delay);
        let projection = AlbersEqualArea::conus()?;
        Ok(Self {
            config,
            limiter,
            projection,
        })
    }

    pub fn config(&self) -> &ElevationConfig {
        &self.config
    }

    /// Resample `geometry` and resolve an elevation for every sample.
    ///
    /// Oracle failures never abort sampling; they become point statuses, and
    /// geometry that cannot be projected yields an empty, failed profile. Only
    /// cache storage errors are returned.
    pub fn sample<C, O>(
        &mut self,
        geometry: &MultiLineString<f64>,
        cache: &mut C,
        oracle: &O,
    ) -> Result<SampledProfile>
    where
        C: ElevationCache + ?Sized,
        O: ElevationOracle + ?Sized,
    {
        let samples = resample(&self.projection, geometry, self.config.sample_interval_m)
            .unwrap_or_else(|e| {
                warn!("[ElevationSampler] Cannot resample geometry: {}", e);
                Vec::new()
            });
        let mut points = Vec::with_capacity(samples.len());
        let mut oracle_calls = 0u32;
        let mut cache_hits = 0u32;
        let mut bad = 0u32;

        for sample in &samples {
            let key = CoordinateKey::new(sample.latitude, sample.longitude);

            let reading = match cache.get(key)? {
                Some(cached) => {
                    cache_hits += 1;
                    Some(cached)
                }
                None => {
                    let (result, calls) = self.fetch_with_retry(oracle, key);
                    oracle_calls += calls;
                    match result {
                        Ok(value) => {
                            cache.put(key, value)?;
                            Some(value)
                        }
                        Err(e) => {
                            warn!(
                                "[ElevationSampler] Point {} ({:.6}, {:.6}) failed after {} attempts: {}",
                                sample.index,
                                sample.latitude,
                                sample.longitude,
                                calls,
                                e
                            );
                            None
                        }
                    }
                }
            };

            let (elevation_m, status) = match reading.map(|v| validate_reading(v, &self.config)) {
                Some(Ok(value)) => (Some(value), PointStatus::Valid),
                Some(Err(e)) => {
                    debug!("[ElevationSampler] Point {}: {}", sample.index, e);
                    (None, PointStatus::Missing)
                }
                None => (None, PointStatus::Failed),
            };
            if status != PointStatus::Valid {
                bad += 1;
            }

            points.push(ElevationPoint {
                index: sample.index,
                distance_m: sample.distance_m,
                latitude: sample.latitude,
                longitude: sample.longitude,
                elevation_m,
                status,
            });
        }

        let total_points = points.len() as u32;
        let status = classify_profile(total_points, bad, self.config.failure_threshold);

        debug!(
            "[ElevationSampler] {} points, {} bad, {} oracle calls, {} cache hits -> {}",
            total_points,
            bad,
            oracle_calls,
            cache_hits,
            status.as_str()
        );

        Ok(SampledProfile {
            points,
            status,
            total_points,
            failed_points: bad,
            oracle_calls,
            cache_hits,
        })
    }

    /// Query the oracle, retrying transport errors with doubling backoff.
    /// Returns the last result and the number of calls made.
    fn fetch_with_retry<O>(&mut self, oracle: &O, key: CoordinateKey) -> (Result<f64>, u32)
    where
        O: ElevationOracle + ?Sized,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            self.limiter.wait();
            attempt += 1;

            match oracle.elevation_at(key.latitude(), key.longitude()) {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt >= max_attempts => return (Err(e), attempt),
                Err(e) => {
                    let backoff = self.config.retry_backoff * (1u32 << (attempt - 1).min(16));
                    debug!(
                        "[ElevationSampler] Oracle error, retry {} after {:?}: {}",
                        attempt, backoff, e
                    );
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    fn straight_line(albers: &AlbersEqualArea, length_m: f64) -> MultiLineString<f64> {
        let start = albers.project(&GeoPoint::new(44.35, -68.22)).unwrap();
        let a = albers.unproject(start).unwrap();
        let b = albers
            .unproject(Coord {
                x: start.x,
                y: start.y + length_m,
            })
            .unwrap();
        MultiLineString::new(vec![LineString::from(vec![
            (a.longitude, a.latitude),
            (b.longitude, b.latitude),
        ])])
    }

    #[test]
    fn test_resample_counts_and_distances() {
        let albers = AlbersEqualArea::conus().unwrap();
        let samples = resample(&albers, &straight_line(&albers, 1000.0), 50.0).unwrap();
        assert_eq!(samples.len(), 21);
        assert_eq!(samples[0].distance_m, 0.0);
        assert_eq!(samples[20].distance_m, 1000.0);

        // trailing partial interval is dropped
        let samples = resample(&albers, &straight_line(&albers, 1020.0), 50.0).unwrap();
        assert_eq!(samples.len(), 21);
        assert_eq!(samples.last().map(|s| s.distance_m), Some(1000.0));
    }

    #[test]
    fn test_resample_walks_parts_in_order() {
        let albers = AlbersEqualArea::conus().unwrap();
        let mut first = straight_line(&albers, 60.0);
        let second = straight_line(&albers, 60.0);
        first.0.extend(second.0);

        let samples = resample(&albers, &first, 50.0).unwrap();
        // 120 m of path -> samples at 0, 50, 100
        assert_eq!(samples.len(), 3);
        let at = |s: &SamplePoint| albers.project(&GeoPoint::new(s.latitude, s.longitude)).unwrap();
        let (origin, third) = (at(&samples[0]), at(&samples[2]));
        // 100 m along the path is 40 m into the second part
        assert!(((third.y - origin.y) - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_resample_empty_geometry() {
        let albers = AlbersEqualArea::conus().unwrap();
        assert!(resample(&albers, &MultiLineString::new(vec![]), 50.0)
            .unwrap()
            .is_empty());
        let line = straight_line(&albers, 100.0);
        assert!(resample(&albers, &line, 0.0).unwrap().is_empty());
        assert!(resample(&albers, &line, f64::NAN).unwrap().is_empty());
    }

    #[test]
    fn test_validate_reading() {
        let config = ElevationConfig::default();
        assert_eq!(validate_reading(152.3, &config), Ok(152.3));
        assert_eq!(validate_reading(-86.0, &config), Ok(-86.0));
        assert_eq!(
            validate_reading(SENTINEL_NO_DATA, &config),
            Err(TrailError::OracleData {
                value: SENTINEL_NO_DATA
            })
        );
        assert!(validate_reading(-600.0, &config).is_err());
        assert!(validate_reading(9500.0, &config).is_err());
        assert!(matches!(
            validate_reading(f64::NAN, &config),
            Err(TrailError::OracleData { .. })
        ));
    }

    #[test]
    fn test_classify_profile() {
        assert_eq!(classify_profile(0, 0, 0.10), ProfileState::Failed);
        assert_eq!(classify_profile(21, 0, 0.10), ProfileState::Complete);
        assert_eq!(classify_profile(21, 1, 0.10), ProfileState::Partial);
        assert_eq!(classify_profile(20, 2, 0.10), ProfileState::Partial);
        assert_eq!(classify_profile(20, 3, 0.10), ProfileState::Failed);
        assert_eq!(classify_profile(3, 3, 1.0), ProfileState::Failed);
    }

    #[test]
    fn test_rate_limiter_spaces_calls() {
        let mut limiter = RateLimiter::new(Duration::from_millis(30));
        let start = Instant::now();
        limiter.wait();
        limiter.wait();
        limiter.wait();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
