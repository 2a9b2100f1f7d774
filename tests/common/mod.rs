//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use geo::{Coord, LineString, MultiLineString};
use trailmatch::geo_utils::AlbersEqualArea;
use trailmatch::{ElevationConfig, ElevationOracle, GeoPoint, Result, TrailError};

/// Jordan Pond, Acadia National Park.
pub const ACADIA: GeoPoint = GeoPoint {
    latitude: 44.3210,
    longitude: -68.2530,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Line through planar offsets (meters east, meters north) from `anchor`.
pub fn offset_line(anchor: GeoPoint, offsets: &[(f64, f64)]) -> LineString<f64> {
    offsets
        .iter()
        .map(|&(dx, dy)| {
            let p = offset_point(anchor, dx, dy);
            (p.longitude, p.latitude)
        })
        .collect::<Vec<_>>()
        .into()
}

/// Point at planar offsets (meters east, meters north) from `anchor`.
pub fn offset_point(anchor: GeoPoint, dx: f64, dy: f64) -> GeoPoint {
    let albers = AlbersEqualArea::conus().expect("projection");
    let origin = albers.project(&anchor).expect("anchor projects");
    albers
        .unproject(Coord {
            x: origin.x + dx,
            y: origin.y + dy,
        })
        .expect("offset unprojects")
}

/// Single-part geometry running due north from `anchor` for `length_m` planar meters.
pub fn north_line(anchor: GeoPoint, length_m: f64) -> MultiLineString<f64> {
    MultiLineString::new(vec![offset_line(anchor, &[(0.0, 0.0), (0.0, length_m)])])
}

/// East-west geometry whose closest point to `anchor` is `offset_m` north of it.
pub fn passing_line(anchor: GeoPoint, offset_m: f64) -> MultiLineString<f64> {
    MultiLineString::new(vec![offset_line(
        anchor,
        &[(-300.0, offset_m), (300.0, offset_m)],
    )])
}

/// Elevation config that never sleeps.
pub fn fast_elevation_config() -> ElevationConfig {
    ElevationConfig {
        rate_limit_delay: Duration::ZERO,
        retry_backoff: Duration::ZERO,
        ..ElevationConfig::default()
    }
}

/// Oracle driven by a closure over (call number, latitude, longitude).
/// Call numbers start at 0 and include retries.
pub struct FnOracle<F> {
    calls: Cell<u32>,
    respond: F,
}

impl<F> FnOracle<F>
where
    F: Fn(u32, f64, f64) -> Result<f64>,
{
    pub fn new(respond: F) -> Self {
        Self {
            calls: Cell::new(0),
            respond,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl<F> ElevationOracle for FnOracle<F>
where
    F: Fn(u32, f64, f64) -> Result<f64>,
{
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        (self.respond)(call, latitude, longitude)
    }
}

/// Oracle that answers a smooth, plausible elevation for every coordinate.
pub fn healthy_oracle() -> FnOracle<impl Fn(u32, f64, f64) -> Result<f64>> {
    FnOracle::new(|_, lat, lon| Ok(100.0 + lat.abs() * 10.0 + lon.abs()))
}

/// Oracle that is always unreachable.
pub fn down_oracle() -> FnOracle<impl Fn(u32, f64, f64) -> Result<f64>> {
    FnOracle::new(|_, _, _| Err(TrailError::transport("connection refused", None)))
}
