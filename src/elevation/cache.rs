//! Coordinate → elevation memo.
//!
//! Keys round latitude and longitude to six decimal places (about 0.11 m), so
//! two samples that land on the same spot share one oracle call. The stored
//! value is the raw oracle reading, sentinel included; entries are never
//! invalidated.

use std::collections::HashMap;

use crate::Result;

const MICRO_DEGREES: f64 = 1_000_000.0;

/// Latitude/longitude rounded to six decimal places, held as integer micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey {
    lat_e6: i64,
    lon_e6: i64,
}

impl CoordinateKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_e6: (latitude * MICRO_DEGREES).round() as i64,
            lon_e6: (longitude * MICRO_DEGREES).round() as i64,
        }
    }

    pub fn from_e6(lat_e6: i64, lon_e6: i64) -> Self {
        Self { lat_e6, lon_e6 }
    }

    pub fn lat_e6(&self) -> i64 {
        self.lat_e6
    }

    pub fn lon_e6(&self) -> i64 {
        self.lon_e6
    }

    /// Rounded latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.lat_e6 as f64 / MICRO_DEGREES
    }

    /// Rounded longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.lon_e6 as f64 / MICRO_DEGREES
    }
}

/// Durable or in-process storage of oracle readings.
pub trait ElevationCache {
    /// Cached reading for a coordinate, if any.
    fn get(&self, key: CoordinateKey) -> Result<Option<f64>>;

    /// Record a reading. An existing entry for the key is replaced.
    fn put(&mut self, key: CoordinateKey, elevation: f64) -> Result<()>;

    /// Number of cached coordinates.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// HashMap-backed cache that lives as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryElevationCache {
    entries: HashMap<CoordinateKey, f64>,
}

impl MemoryElevationCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ElevationCache for MemoryElevationCache {
    fn get(&self, key: CoordinateKey) -> Result<Option<f64>> {
        Ok(self.entries.get(&key).copied())
    }

    fn put(&mut self, key: CoordinateKey, elevation: f64) -> Result<()> {
        self.entries.insert(key, elevation);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
