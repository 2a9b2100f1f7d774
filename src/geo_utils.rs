//! # Geographic Utilities
//!
//! Projection and planar geometry used for every length and distance in the
//! pipeline.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`AlbersEqualArea::conus`] | NAD83 / Conus Albers (EPSG:5070) transform via PROJ |
//! | [`planar_length_m`] | Length of a geographic multi-line in projected meters |
//! | [`point_to_lines_distance`] | Minimum planar distance from a point to a multi-line |
//! | [`validate_geometry`] | Reject empty or out-of-range geometry |
//!
//! ## Coordinate Systems
//!
//! Geometry is stored geographically (EPSG:4326, x = longitude, y = latitude).
//! Lengths and distances are always computed after projecting into the
//! equal-area EPSG:5070 CRS, in meters. The inverse transform places resampled
//! points back on the map.

use std::fmt;

use geo::{Coord, LineString, MultiLineString};
use proj::Proj;

use crate::{GeoPoint, OptionExt, Result, TrailError};

/// Meters in a statute mile.
pub const METERS_PER_MILE: f64 = 1609.34;

const GEOGRAPHIC_CRS: &str = "EPSG:4326";
const PLANAR_CRS: &str = "EPSG:5070";

// =============================================================================
// Projection
// =============================================================================

/// Forward and inverse transforms between WGS84 and NAD83 / Conus Albers.
///
/// PROJ normalizes both transforms to (x = longitude, y = latitude) axis order.
pub struct AlbersEqualArea {
    forward: Proj,
    inverse: Proj,
}

impl fmt::Debug for AlbersEqualArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlbersEqualArea({} <-> {})", GEOGRAPHIC_CRS, PLANAR_CRS)
    }
}

impl AlbersEqualArea {
    /// NAD83 / Conus Albers (EPSG:5070).
    ///
    /// Fails only when PROJ cannot resolve the CRS definitions, which makes
    /// every run impossible, so the error is a configuration error.
    pub fn conus() -> Result<Self> {
        let forward = Proj::new_known_crs(GEOGRAPHIC_CRS, PLANAR_CRS, None)
            .map_err(|e| transform_setup_error(GEOGRAPHIC_CRS, PLANAR_CRS, e))?;
        let inverse = Proj::new_known_crs(PLANAR_CRS, GEOGRAPHIC_CRS, None)
            .map_err(|e| transform_setup_error(PLANAR_CRS, GEOGRAPHIC_CRS, e))?;
        Ok(Self { forward, inverse })
    }

    /// Project a geographic point to planar meters.
    pub fn project(&self, point: &GeoPoint) -> Result<Coord<f64>> {
        self.project_coord(Coord {
            x: point.longitude,
            y: point.latitude,
        })
    }

    /// Project a geographic (x = lon, y = lat) coordinate to planar meters.
    pub fn project_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self.forward.convert((coord.x, coord.y)).map_err(|e| {
            TrailError::geometry(PLANAR_CRS, format!("({}, {}): {}", coord.y, coord.x, e))
        })?;
        Ok(Coord { x, y })
    }

    /// Map planar meters back to a geographic point.
    pub fn unproject(&self, coord: Coord<f64>) -> Result<GeoPoint> {
        let (longitude, latitude) = self.inverse.convert((coord.x, coord.y)).map_err(|e| {
            TrailError::geometry(GEOGRAPHIC_CRS, format!("({}, {}): {}", coord.x, coord.y, e))
        })?;
        Ok(GeoPoint::new(latitude, longitude))
    }

    /// Project every coordinate of a line.
    pub fn project_line(&self, line: &LineString<f64>) -> Result<LineString<f64>> {
        line.coords()
            .map(|c| self.project_coord(*c))
            .collect::<Result<Vec<_>>>()
            .map(LineString::new)
    }

    /// Project every part of a multi-line.
    pub fn project_lines(&self, lines: &MultiLineString<f64>) -> Result<MultiLineString<f64>> {
        lines
            .iter()
            .map(|l| self.project_line(l))
            .collect::<Result<Vec<_>>>()
            .map(MultiLineString::new)
    }
}

fn transform_setup_error(from: &str, to: &str, e: impl fmt::Display) -> TrailError {
    TrailError::config(format!("cannot build {} -> {} transform: {}", from, to, e))
}

// =============================================================================
// Planar Measurements
// =============================================================================

/// Length of an already-projected line in meters.
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|seg| seg.dx().hypot(seg.dy())).sum()
}

/// Length of an already-projected multi-line in meters.
pub fn lines_length(lines: &MultiLineString<f64>) -> f64 {
    lines.iter().map(line_length).sum()
}

/// Length of a geographic multi-line measured in the planar projection, in meters.
pub fn planar_length_m(
    projection: &AlbersEqualArea,
    geometry: &MultiLineString<f64>,
) -> Result<f64> {
    Ok(lines_length(&projection.project_lines(geometry)?))
}

/// Minimum distance from a point to a segment, all in planar meters.
pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    (p.x - cx).hypot(p.y - cy)
}

/// Minimum distance from a projected point to a projected multi-line.
///
/// Returns `f64::INFINITY` for empty geometry.
pub fn point_to_lines_distance(point: Coord<f64>, lines: &MultiLineString<f64>) -> f64 {
    lines
        .iter()
        .flat_map(|line| {
            let coords = &line.0;
            let single = (coords.len() == 1)
                .then(|| (point.x - coords[0].x).hypot(point.y - coords[0].y));
            coords
                .windows(2)
                .map(move |w| point_segment_distance(point, w[0], w[1]))
                .chain(single)
        })
        .fold(f64::INFINITY, f64::min)
}

// =============================================================================
// Validation
// =============================================================================

/// Check that a geographic multi-line is usable: at least one part with two
/// or more points, and every coordinate a valid latitude/longitude.
pub fn validate_geometry(context: &str, geometry: &MultiLineString<f64>) -> Result<()> {
    geometry
        .iter()
        .find(|line| line.0.len() >= 2)
        .ok_or_geometry(context, "no line with at least two points")?;

    if let Some(bad) = geometry
        .iter()
        .flat_map(|line| line.coords())
        .find(|c| !GeoPoint::new(c.y, c.x).is_valid())
    {
        return Err(TrailError::geometry(
            context,
            format!("invalid coordinate ({}, {})", bad.y, bad.x),
        ));
    }

    Ok(())
}
