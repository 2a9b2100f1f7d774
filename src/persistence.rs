//! # Trail Store
//!
//! SQLite storage for everything the pipeline produces.
//!
//! ## Tables
//!
//! | Table | Key | Written by |
//! |-------|-----|-----------|
//! | `canonical_trails` | id | aggregation, replaced whole per (park, source) |
//! | `hiking_locations` | id | location import |
//! | `match_results` | location_id | matching, replaced wholesale per run |
//! | `elevation_profiles` | location_id | elevation sampling |
//! | `elevation_cache` | (lat_e6, lon_e6) | elevation sampling, never invalidated |
//!
//! Geometry and profile points are stored as MessagePack blobs. Each write
//! method commits on its own, so an interrupted run leaves consistent state.

use std::path::Path;

use geo::{LineString, MultiLineString};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::dedup::unified_view;
use crate::elevation::cache::{CoordinateKey, ElevationCache};
use crate::{
    CanonicalTrail, DedupConfig, ElevationPoint, ElevationProfile, HikingLocation, MatchResult,
    MatchStatus, ProfileState, Result, TrailError, TrailSource,
};

type LinePoints = Vec<Vec<(f64, f64)>>;

fn encode_geometry(geometry: &MultiLineString<f64>) -> Result<Vec<u8>> {
    let parts: LinePoints = geometry
        .iter()
        .map(|line| line.coords().map(|c| (c.x, c.y)).collect())
        .collect();
    rmp_serde::to_vec(&parts).map_err(persistence_error)
}

fn decode_geometry(blob: &[u8]) -> Result<MultiLineString<f64>> {
    let parts: LinePoints = rmp_serde::from_slice(blob).map_err(persistence_error)?;
    Ok(MultiLineString::new(
        parts.into_iter().map(LineString::from).collect(),
    ))
}

fn persistence_error(e: impl std::fmt::Display) -> TrailError {
    TrailError::Persistence {
        message: e.to_string(),
    }
}

fn parse_source(tag: &str) -> Result<TrailSource> {
    TrailSource::from_tag(tag).ok_or_else(|| persistence_error(format!("unknown source '{}'", tag)))
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Stored trail row before blob decoding.
struct TrailRow {
    id: String,
    park_code: String,
    source: String,
    name: String,
    normalized_name: String,
    geometry: Vec<u8>,
    length_miles: f64,
    fragment_count: u32,
}

impl TrailRow {
    const COLUMNS: &'static str =
        "id, park_code, source, name, normalized_name, geometry, length_miles, fragment_count";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            park_code: row.get(1)?,
            source: row.get(2)?,
            name: row.get(3)?,
            normalized_name: row.get(4)?,
            geometry: row.get(5)?,
            length_miles: row.get(6)?,
            fragment_count: row.get(7)?,
        })
    }

    fn into_trail(self) -> Result<CanonicalTrail> {
        Ok(CanonicalTrail {
            source: parse_source(&self.source)?,
            geometry: decode_geometry(&self.geometry)?,
            id: self.id,
            park_code: self.park_code,
            name: self.name,
            normalized_name: self.normalized_name,
            length_miles: self.length_miles,
            fragment_count: self.fragment_count,
        })
    }
}

/// SQLite-backed store of trails, locations, matches, profiles and cached elevations.
pub struct TrailStore {
    db: Connection,
}

impl TrailStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db = Connection::open(db_path.as_ref())?;
        Self::init_schema(&db)?;
        debug!("[TrailStore] Opened {}", db_path.as_ref().display());
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Canonical trails, one row per (park, source, normalized name)
            CREATE TABLE IF NOT EXISTS canonical_trails (
                id TEXT PRIMARY KEY,
                park_code TEXT NOT NULL,
                source TEXT NOT NULL,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                geometry BLOB NOT NULL,
                length_miles REAL NOT NULL,
                fragment_count INTEGER NOT NULL,
                collected_at INTEGER NOT NULL
            );

            -- User-supplied point locations
            CREATE TABLE IF NOT EXISTS hiking_locations (
                id INTEGER PRIMARY KEY,
                park_code TEXT NOT NULL,
                name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL
            );

            -- One match result per location
            CREATE TABLE IF NOT EXISTS match_results (
                location_id INTEGER PRIMARY KEY,
                park_code TEXT NOT NULL,
                location_name TEXT NOT NULL,
                matched_trail_id TEXT,
                matched_trail_name TEXT,
                source TEXT,
                name_similarity_score REAL,
                min_distance_m REAL,
                confidence_score REAL,
                match_status TEXT NOT NULL
            );

            -- One elevation profile per matched location
            CREATE TABLE IF NOT EXISTS elevation_profiles (
                location_id INTEGER PRIMARY KEY,
                park_code TEXT NOT NULL,
                trail_id TEXT NOT NULL,
                trail_name TEXT NOT NULL,
                source TEXT NOT NULL,
                points BLOB NOT NULL,
                collection_status TEXT NOT NULL,
                total_points INTEGER NOT NULL,
                failed_points INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Raw oracle readings keyed by micro-degree coordinates
            CREATE TABLE IF NOT EXISTS elevation_cache (
                lat_e6 INTEGER NOT NULL,
                lon_e6 INTEGER NOT NULL,
                elevation REAL NOT NULL,
                fetched_at INTEGER NOT NULL,
                PRIMARY KEY (lat_e6, lon_e6)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_trails_park_source
                ON canonical_trails(park_code, source);
            CREATE INDEX IF NOT EXISTS idx_locations_park ON hiking_locations(park_code);
            CREATE INDEX IF NOT EXISTS idx_matches_park ON match_results(park_code);
            CREATE INDEX IF NOT EXISTS idx_profiles_park ON elevation_profiles(park_code);
        "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Trails
    // ========================================================================

    /// Replace every trail of one (park, source) with a freshly aggregated set.
    pub fn replace_trails(
        &mut self,
        park_code: &str,
        source: TrailSource,
        trails: &[CanonicalTrail],
    ) -> Result<usize> {
        let collected_at = now_unix();
        let tx = self.db.transaction()?;
        tx.execute(
            "DELETE FROM canonical_trails WHERE park_code = ? AND source = ?",
            params![park_code, source.tag()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO canonical_trails
                 (id, park_code, source, name, normalized_name, geometry, length_miles,
                  fragment_count, collected_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for trail in trails {
                stmt.execute(params![
                    trail.id,
                    trail.park_code,
                    trail.source.tag(),
                    trail.name,
                    trail.normalized_name,
                    encode_geometry(&trail.geometry)?,
                    trail.length_miles,
                    trail.fragment_count,
                    collected_at
                ])?;
            }
        }
        tx.commit()?;

        info!(
            "[TrailStore] Stored {} {} trails for {}",
            trails.len(),
            source,
            park_code
        );
        Ok(trails.len())
    }

    /// Fetch one trail by id, whatever its duplicate status.
    pub fn get_trail(&self, id: &str) -> Result<Option<CanonicalTrail>> {
        let sql = format!("SELECT {} FROM canonical_trails WHERE id = ?", TrailRow::COLUMNS);
        let row = self
            .db
            .query_row(&sql, params![id], TrailRow::from_row)
            .optional()?;
        row.map(TrailRow::into_trail).transpose()
    }

    /// All stored trails, optionally for one park. Ordered by park, then TNM
    /// before OSM, then normalized name.
    pub fn list_trails(&self, park_code: Option<&str>) -> Result<Vec<CanonicalTrail>> {
        let sql = format!(
            "SELECT {} FROM canonical_trails
             WHERE (?1 IS NULL OR park_code = ?1)
             ORDER BY park_code, CASE source WHEN 'TNM' THEN 0 ELSE 1 END, normalized_name",
            TrailRow::COLUMNS
        );
        let mut stmt = self.db.prepare(&sql)?;
        let rows = stmt
            .query_map(params![park_code], TrailRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(TrailRow::into_trail).collect()
    }

    /// Trails of a park with OSM duplicates of TNM trails hidden.
    pub fn list_unified_trails(
        &self,
        park_code: &str,
        config: &DedupConfig,
    ) -> Result<Vec<CanonicalTrail>> {
        let trails = self.list_trails(Some(park_code))?;
        Ok(unified_view(&trails, config)
            .into_iter()
            .cloned()
            .collect())
    }

    // ========================================================================
    // Locations
    // ========================================================================

    /// Import locations. Existing ids are overwritten.
    pub fn upsert_locations(&mut self, locations: &[HikingLocation]) -> Result<usize> {
        let tx = self.db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO hiking_locations (id, park_code, name, latitude, longitude)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for l in locations {
                stmt.execute(params![l.id, l.park_code, l.name, l.latitude, l.longitude])?;
            }
        }
        tx.commit()?;
        Ok(locations.len())
    }

    /// Locations ordered by id, optionally for one park.
    pub fn list_locations(&self, park_code: Option<&str>) -> Result<Vec<HikingLocation>> {
        let mut stmt = self.db.prepare(
            "SELECT id, park_code, name, latitude, longitude FROM hiking_locations
             WHERE (?1 IS NULL OR park_code = ?1)
             ORDER BY id",
        )?;
        let locations = stmt
            .query_map(params![park_code], |row| {
                Ok(HikingLocation {
                    id: row.get(0)?,
                    park_code: row.get(1)?,
                    name: row.get(2)?,
                    latitude: row.get(3)?,
                    longitude: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(locations)
    }

    // ========================================================================
    // Match Results
    // ========================================================================

    /// Replace all match results. Profiles whose location is no longer matched
    /// are dropped with them.
    pub fn replace_match_results(&mut self, results: &[MatchResult]) -> Result<()> {
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM match_results", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO match_results
                 (location_id, park_code, location_name, matched_trail_id, matched_trail_name,
                  source, name_similarity_score, min_distance_m, confidence_score, match_status)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for r in results {
                stmt.execute(params![
                    r.location_id,
                    r.park_code,
                    r.location_name,
                    r.matched_trail_id,
                    r.matched_trail_name,
                    r.source.map(|s| s.tag()),
                    r.name_similarity_score,
                    r.min_distance_m,
                    r.confidence_score,
                    r.match_status.as_str()
                ])?;
            }
        }
        let dropped = tx.execute(
            "DELETE FROM elevation_profiles WHERE location_id NOT IN
             (SELECT location_id FROM match_results WHERE match_status = 'MATCHED')",
            [],
        )?;
        tx.commit()?;

        if dropped > 0 {
            debug!("[TrailStore] Dropped {} profiles of unmatched locations", dropped);
        }
        Ok(())
    }

    /// Match results ordered by location id, optionally for one park.
    pub fn list_match_results(&self, park_code: Option<&str>) -> Result<Vec<MatchResult>> {
        let mut stmt = self.db.prepare(
            "SELECT location_id, park_code, location_name, matched_trail_id, matched_trail_name,
                    source, name_similarity_score, min_distance_m, confidence_score, match_status
             FROM match_results
             WHERE (?1 IS NULL OR park_code = ?1)
             ORDER BY location_id",
        )?;
        let rows = stmt
            .query_map(params![park_code], |row| {
                Ok((
                    MatchResult {
                        location_id: row.get(0)?,
                        park_code: row.get(1)?,
                        location_name: row.get(2)?,
                        matched_trail_id: row.get(3)?,
                        matched_trail_name: row.get(4)?,
                        source: None,
                        name_similarity_score: row.get(6)?,
                        min_distance_m: row.get(7)?,
                        confidence_score: row.get(8)?,
                        match_status: MatchStatus::NoMatch,
                    },
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut result, source, status)| -> Result<MatchResult> {
                result.source = source.as_deref().map(parse_source).transpose()?;
                result.match_status = MatchStatus::parse(&status).ok_or_else(|| {
                    persistence_error(format!("unknown match status '{}'", status))
                })?;
                Ok(result)
            })
            .collect()
    }

    // ========================================================================
    // Elevation Profiles
    // ========================================================================

    /// Insert or replace the profile of a location.
    pub fn save_profile(&mut self, profile: &ElevationProfile) -> Result<()> {
        let points = rmp_serde::to_vec(&profile.points).map_err(persistence_error)?;
        self.db.execute(
            "INSERT OR REPLACE INTO elevation_profiles
             (location_id, park_code, trail_id, trail_name, source, points, collection_status,
              total_points, failed_points, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                profile.location_id,
                profile.park_code,
                profile.trail_id,
                profile.trail_name,
                profile.source.tag(),
                points,
                profile.collection_status.as_str(),
                profile.total_points,
                profile.failed_points,
                now_unix()
            ],
        )?;
        Ok(())
    }

    /// Profile of a location, if one was ever started.
    pub fn get_profile(&self, location_id: i64) -> Result<Option<ElevationProfile>> {
        let row = self
            .db
            .query_row(
                "SELECT location_id, park_code, trail_id, trail_name, source, points,
                        collection_status, total_points, failed_points
                 FROM elevation_profiles WHERE location_id = ?",
                params![location_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, u32>(7)?,
                        row.get::<_, u32>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            location_id,
            park_code,
            trail_id,
            trail_name,
            source,
            blob,
            status,
            total_points,
            failed_points,
        )) = row
        else {
            return Ok(None);
        };

        let points: Vec<ElevationPoint> = rmp_serde::from_slice(&blob).map_err(persistence_error)?;
        Ok(Some(ElevationProfile {
            location_id,
            park_code,
            trail_id,
            trail_name,
            source: parse_source(&source)?,
            points,
            collection_status: ProfileState::parse(&status)
                .ok_or_else(|| persistence_error(format!("unknown profile status '{}'", status)))?,
            total_points,
            failed_points,
        }))
    }

    /// Current state of a location's profile; `NotStarted` when none exists.
    pub fn profile_state(&self, location_id: i64) -> Result<ProfileState> {
        let status: Option<String> = self
            .db
            .query_row(
                "SELECT collection_status FROM elevation_profiles WHERE location_id = ?",
                params![location_id],
                |row| row.get(0),
            )
            .optional()?;
        match status {
            None => Ok(ProfileState::NotStarted),
            Some(s) => ProfileState::parse(&s)
                .ok_or_else(|| persistence_error(format!("unknown profile status '{}'", s))),
        }
    }
}

impl ElevationCache for TrailStore {
    fn get(&self, key: CoordinateKey) -> Result<Option<f64>> {
        let value = self
            .db
            .query_row(
                "SELECT elevation FROM elevation_cache WHERE lat_e6 = ? AND lon_e6 = ?",
                params![key.lat_e6(), key.lon_e6()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: CoordinateKey, elevation: f64) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO elevation_cache (lat_e6, lon_e6, elevation, fetched_at)
             VALUES (?, ?, ?, ?)",
            params![key.lat_e6(), key.lon_e6(), elevation, now_unix()],
        )?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM elevation_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
