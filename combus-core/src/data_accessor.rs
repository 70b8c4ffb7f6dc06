//! Data Accessor (component B): a read-only facade over every static
//! resource named in the design spec's external-interfaces section, loaded
//! once and shared by reference across requests.
//!
//! Grounded on the teacher's `loaders.rs` (`read_csv`, `CsvReadOptions`
//! pattern) for the tabular-resource loading shape; the resource list and
//! key shapes follow `original_source/prometheus/data_loader.py::DataAccessor`
//! (file path constants, the descending `(minute, walk)` fallback in
//! `load_geojson_name_key_dict`, `load_spot_to_spot_summary_dict`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use ahash::{HashMap, HashMapExt};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::geo_primitives::Coord;
use crate::transit::graph::TimeTable;
use crate::Error;

fn read_csv(path: &Path) -> Result<DataFrame, Error> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .map_err(Error::from)
}

fn string_column<'a>(df: &'a DataFrame, name: &str) -> Result<impl Iterator<Item = &'a str> + 'a, Error> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(move |v| v.ok_or_else(|| Error::MissingValue(name.to_string())))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter())
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, Error> {
    df.column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| Error::MissingValue(name.to_string())))
        .collect()
}

/// A point of interest loaded from `spot_list` (spec 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spot {
    pub id: String,
    pub name: String,
    pub coord: Coord,
    pub category: String,
}

/// A candidate stop for a new combus line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombusStopCandidate {
    pub id: String,
    pub name: String,
    pub coord: Coord,
}

/// A precomputed stop-to-stop car route, keyed `(from_id, to_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombusRouteRecord {
    pub distance_km: f64,
    pub duration_min: i64,
    pub polyline: String,
}

/// A representative destination used by the OD-Pair Selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefPoint {
    pub id: String,
    pub name: String,
    pub coord: Coord,
}

/// One `(from, to, start_time_4digit) -> (duration, walk)` row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpotToSpotSummary {
    pub duration_min: i64,
    pub walk_m: f64,
}

/// Population and geometry for one 3rd-order mesh tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRecord {
    pub mesh_code: i64,
    pub population: i64,
    pub geometry_geojson: String,
}

/// `(geometry_geojson, reachable_mesh_set)`, the deserialised equivalent of
/// the reference design's pickled isochrone artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsochroneRecord {
    pub geometry_geojson: String,
    pub reachable_mesh_set: HashSet<i64>,
}

/// A transit stop loaded from the pre-joined GTFS stops table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtfsStop {
    pub stop_id: String,
    pub name: String,
    pub coord: Coord,
}

/// A pre-joined average inter-stop travel time (spec: "timetables arrive
/// pre-joined", so no GTFS `stop_times`/`trips` parsing happens here).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GtfsAverageTravelTime {
    pub minutes: f64,
}

#[derive(Debug, Clone)]
struct IsochroneFileKey {
    spot_id: String,
    minute: i64,
    walk: i64,
    start_time: String,
    path: PathBuf,
}

fn parse_isochrone_filename(path: &Path) -> Option<IsochroneFileKey> {
    let stem = path.file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 4 {
        return None;
    }
    Some(IsochroneFileKey {
        spot_id: parts[0].to_string(),
        minute: parts[1].parse().ok()?,
        walk: parts[2].parse().ok()?,
        start_time: parts[3].to_string(),
        path: path.to_path_buf(),
    })
}

/// Loads and memoises every static resource named in spec 6. Construction
/// fails fast on a missing/malformed required file; only the binary
/// artefact caches (isochrones, detailed routes) degrade lazily (a miss is
/// `Error::DataNotFound`, not a load-time failure).
pub struct DataAccessor {
    spot_list: HashMap<String, Vec<Spot>>,
    combus_stops: HashMap<String, CombusStopCandidate>,
    combus_routes: HashMap<(String, String), CombusRouteRecord>,
    ref_points: HashMap<String, RefPoint>,
    spot_to_spot_summary: HashMap<(String, String, String), SpotToSpotSummary>,
    mesh: HashMap<i64, MeshRecord>,
    best_combus_stop_sequences: HashMap<(String, i64), Vec<Vec<String>>>,
    gtfs_stops: HashMap<String, GtfsStop>,
    gtfs_average_travel_times: HashMap<(String, String), GtfsAverageTravelTime>,
    gtfs_time_tables: HashMap<(String, String), TimeTable>,
    gtfs_shapes: HashMap<(String, String), String>,

    isochrone_index: Vec<IsochroneFileKey>,
    isochrone_cache: RwLock<HashMap<PathBuf, Arc<IsochroneRecord>>>,
    route_cache_dir: PathBuf,
    route_cache: RwLock<HashMap<String, Arc<serde_json::Value>>>,
}

impl DataAccessor {
    pub fn load(config: &Config) -> Result<Self, Error> {
        let spot_list = load_spot_list(&config.spot_list_path)?;
        let combus_stops = load_combus_stops(&config.combus_stops_path)?;
        let combus_routes = load_combus_routes(&config.combus_routes_path)?;
        let ref_points = load_ref_points(&config.ref_points_path)?;
        let spot_to_spot_summary = load_spot_to_spot_summary(&config.spot_to_spot_summary_path)?;
        let mesh = load_mesh(&config.mesh_path)?;
        let best_combus_stop_sequences =
            load_best_stop_sequences(&config.best_combus_stop_sequences_path)?;

        let gtfs_stops = load_gtfs_stops(&config.gtfs_dir.join("stops.csv"))?;
        let gtfs_average_travel_times =
            load_gtfs_average_travel_times(&config.gtfs_dir.join("average_travel_times.csv"))?;
        let gtfs_time_tables = load_gtfs_time_tables(&config.gtfs_dir.join("trip_pairs.csv"))?;
        let gtfs_shapes = load_gtfs_shapes(&config.gtfs_shapes_path)?;

        let isochrone_index = index_isochrone_dir(&config.isochrone_dir)?;

        Ok(Self {
            spot_list,
            combus_stops,
            combus_routes,
            ref_points,
            spot_to_spot_summary,
            mesh,
            best_combus_stop_sequences,
            gtfs_stops,
            gtfs_average_travel_times,
            gtfs_time_tables,
            gtfs_shapes,
            isochrone_index,
            isochrone_cache: RwLock::new(HashMap::new()),
            route_cache_dir: config.route_cache_dir.clone(),
            route_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn spots_by_category(&self, category: &str) -> &[Spot] {
        self.spot_list.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_spots(&self) -> impl Iterator<Item = &Spot> {
        self.spot_list.values().flatten()
    }

    pub fn combus_stop(&self, id: &str) -> Option<&CombusStopCandidate> {
        self.combus_stops.get(id)
    }

    pub fn combus_route(&self, from: &str, to: &str) -> Option<&CombusRouteRecord> {
        self.combus_routes.get(&(from.to_string(), to.to_string()))
    }

    pub fn ref_point(&self, id: &str) -> Option<&RefPoint> {
        self.ref_points.get(id)
    }

    pub fn all_ref_points(&self) -> impl Iterator<Item = &RefPoint> {
        self.ref_points.values()
    }

    pub fn spot_to_spot(&self, from: &str, to: &str, start_time_key: &str) -> Option<SpotToSpotSummary> {
        self.spot_to_spot_summary
            .get(&(from.to_string(), to.to_string(), start_time_key.to_string()))
            .copied()
    }

    pub fn mesh(&self, mesh_code: i64) -> Option<&MeshRecord> {
        self.mesh.get(&mesh_code)
    }

    pub fn all_mesh(&self) -> impl Iterator<Item = &MeshRecord> {
        self.mesh.values()
    }

    pub fn best_combus_stop_sequence(&self, spot_type: &str, duration_limit: i64) -> Option<&[Vec<String>]> {
        self.best_combus_stop_sequences
            .get(&(spot_type.to_string(), duration_limit))
            .map(Vec::as_slice)
    }

    pub fn gtfs_stops(&self) -> impl Iterator<Item = &GtfsStop> {
        self.gtfs_stops.values()
    }

    pub fn gtfs_average_travel_times(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.gtfs_average_travel_times
            .iter()
            .map(|((from, to), v)| (from.as_str(), to.as_str(), v.minutes))
    }

    pub fn gtfs_time_table(&self, from: &str, to: &str) -> Option<&TimeTable> {
        self.gtfs_time_tables.get(&(from.to_string(), to.to_string()))
    }

    pub fn gtfs_shape(&self, from: &str, to: &str) -> Option<&str> {
        self.gtfs_shapes.get(&(from.to_string(), to.to_string())).map(String::as_str)
    }

    /// Resolves the isochrone record for the largest `(minute, walk)` pair
    /// present in the index that is `(<= max_minute, <= max_walk)` for the
    /// given `(spot_id, start_time)`, memoising file contents after first
    /// access (spec 4.F / design note "Isochrone fallback").
    pub fn load_isochrone(
        &self,
        spot_id: &str,
        max_minute: i64,
        max_walk: i64,
        start_time: &str,
    ) -> Result<Arc<IsochroneRecord>, Error> {
        let best = self
            .isochrone_index
            .iter()
            .filter(|k| k.spot_id == spot_id && k.start_time == start_time)
            .filter(|k| k.minute <= max_minute && k.walk <= max_walk)
            .max_by_key(|k| (k.minute, k.walk))
            .ok_or_else(|| {
                Error::DataNotFound(format!(
                    "isochrone for spot {spot_id} <= {max_minute}min/{max_walk}m at {start_time}"
                ))
            })?;

        if let Some(cached) = self.isochrone_cache.read().unwrap().get(&best.path) {
            return Ok(cached.clone());
        }

        let bytes = std::fs::read(&best.path)?;
        let record: IsochroneRecord = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidData(format!("malformed isochrone {:?}: {e}", best.path)))?;
        let record = Arc::new(record);
        self.isochrone_cache.write().unwrap().insert(best.path.clone(), record.clone());
        Ok(record)
    }

    /// Looks up a precomputed detailed route by its exact `from_to_starttime`
    /// key, memoising the parsed JSON (spec 6 "Persisted state").
    pub fn load_route(&self, from: &str, to: &str, start_time: &str) -> Result<Arc<serde_json::Value>, Error> {
        let key = format!("{from}_{to}_{start_time}");
        if let Some(cached) = self.route_cache.read().unwrap().get(&key) {
            return Ok(cached.clone());
        }

        let path = self.route_cache_dir.join(format!("{key}.json"));
        let bytes = std::fs::read(&path).map_err(|_| Error::DataNotFound(key.clone()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidData(format!("malformed route {key}: {e}")))?;
        let value = Arc::new(value);
        self.route_cache.write().unwrap().insert(key, value.clone());
        Ok(value)
    }
}

fn load_spot_list(path: &Path) -> Result<HashMap<String, Vec<Spot>>, Error> {
    let df = read_csv(path)?;
    let ids = string_column(&df, "id")?;
    let names = string_column(&df, "name")?;
    let categories = string_column(&df, "category")?;
    let lats = f64_column(&df, "lat")?;
    let lons = f64_column(&df, "lon")?;

    let mut out: HashMap<String, Vec<Spot>> = HashMap::new();
    for (((id, name), category), (lat, lon)) in ids.zip(names).zip(categories).zip(lats.into_iter().zip(lons)) {
        out.entry(category.to_string()).or_default().push(Spot {
            id: id.to_string(),
            name: name.to_string(),
            coord: Coord::new(lat, lon),
            category: category.to_string(),
        });
    }
    Ok(out)
}

fn load_combus_stops(path: &Path) -> Result<HashMap<String, CombusStopCandidate>, Error> {
    let df = read_csv(path)?;
    let ids = string_column(&df, "id")?;
    let names = string_column(&df, "name")?;
    let lats = f64_column(&df, "lat")?;
    let lons = f64_column(&df, "lon")?;

    Ok(ids
        .zip(names)
        .zip(lats.into_iter().zip(lons))
        .map(|((id, name), (lat, lon))| {
            (
                id.to_string(),
                CombusStopCandidate { id: id.to_string(), name: name.to_string(), coord: Coord::new(lat, lon) },
            )
        })
        .collect())
}

fn load_combus_routes(path: &Path) -> Result<HashMap<(String, String), CombusRouteRecord>, Error> {
    let df = read_csv(path)?;
    let froms = string_column(&df, "from")?;
    let tos = string_column(&df, "to")?;
    let distances = f64_column(&df, "distance_km")?;
    let durations = f64_column(&df, "duration_min")?;
    let polylines = string_column(&df, "polyline")?;

    let mut out = HashMap::new();
    for ((((from, to), distance_km), duration_min), polyline) in
        froms.zip(tos).zip(distances).zip(durations).zip(polylines)
    {
        out.insert(
            (from.to_string(), to.to_string()),
            CombusRouteRecord { distance_km, duration_min: duration_min as i64, polyline: polyline.to_string() },
        );
    }
    Ok(out)
}

fn load_ref_points(path: &Path) -> Result<HashMap<String, RefPoint>, Error> {
    let df = read_csv(path)?;
    let ids = string_column(&df, "id")?;
    let names = string_column(&df, "name")?;
    let lats = f64_column(&df, "lat")?;
    let lons = f64_column(&df, "lon")?;

    Ok(ids
        .zip(names)
        .zip(lats.into_iter().zip(lons))
        .map(|((id, name), (lat, lon))| {
            (id.to_string(), RefPoint { id: id.to_string(), name: name.to_string(), coord: Coord::new(lat, lon) })
        })
        .collect())
}

fn load_spot_to_spot_summary(path: &Path) -> Result<HashMap<(String, String, String), SpotToSpotSummary>, Error> {
    let df = read_csv(path)?;
    let froms = string_column(&df, "from")?;
    let tos = string_column(&df, "to")?;
    let start_times = string_column(&df, "start_time")?;
    let durations = f64_column(&df, "duration_min")?;
    let walks = f64_column(&df, "walk_m")?;

    let mut out = HashMap::new();
    for ((((from, to), start_time), duration_min), walk_m) in
        froms.zip(tos).zip(start_times).zip(durations).zip(walks)
    {
        out.insert(
            (from.to_string(), to.to_string(), start_time.to_string()),
            SpotToSpotSummary { duration_min: duration_min as i64, walk_m },
        );
    }
    Ok(out)
}

fn load_mesh(path: &Path) -> Result<HashMap<i64, MeshRecord>, Error> {
    let df = read_csv(path)?;
    let codes = df.column("mesh_code")?.cast(&DataType::Int64)?;
    let populations = df.column("population")?.cast(&DataType::Int64)?;
    let geometries = string_column(&df, "geometry_geojson")?;

    let mut out = HashMap::new();
    for ((code, population), geometry_geojson) in codes.i64()?.iter().zip(populations.i64()?.iter()).zip(geometries)
    {
        let code = code.ok_or_else(|| Error::MissingValue("mesh_code".into()))?;
        let population = population.ok_or_else(|| Error::MissingValue("population".into()))?;
        out.insert(code, MeshRecord { mesh_code: code, population, geometry_geojson: geometry_geojson.to_string() });
    }
    Ok(out)
}

fn load_best_stop_sequences(path: &Path) -> Result<HashMap<(String, i64), Vec<Vec<String>>>, Error> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let bytes = std::fs::read(path)?;
    let raw: Vec<(String, i64, Vec<Vec<String>>)> = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidData(format!("malformed best stop sequence file: {e}")))?;
    Ok(raw.into_iter().map(|(spot_type, limit, seqs)| ((spot_type, limit), seqs)).collect())
}

fn load_gtfs_stops(path: &Path) -> Result<HashMap<String, GtfsStop>, Error> {
    let df = read_csv(path)?;
    let ids = string_column(&df, "stop_id")?;
    let names = string_column(&df, "name")?;
    let lats = f64_column(&df, "lat")?;
    let lons = f64_column(&df, "lon")?;

    Ok(ids
        .zip(names)
        .zip(lats.into_iter().zip(lons))
        .map(|((stop_id, name), (lat, lon))| {
            (
                stop_id.to_string(),
                GtfsStop { stop_id: stop_id.to_string(), name: name.to_string(), coord: Coord::new(lat, lon) },
            )
        })
        .collect())
}

fn load_gtfs_average_travel_times(path: &Path) -> Result<HashMap<(String, String), GtfsAverageTravelTime>, Error> {
    let df = read_csv(path)?;
    let froms = string_column(&df, "from")?;
    let tos = string_column(&df, "to")?;
    let minutes = f64_column(&df, "minutes")?;

    Ok(froms
        .zip(tos)
        .zip(minutes)
        .map(|((from, to), minutes)| ((from.to_string(), to.to_string()), GtfsAverageTravelTime { minutes }))
        .collect())
}

fn split_times(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(';').map(str::to_string).collect()
    }
}

fn load_gtfs_time_tables(path: &Path) -> Result<HashMap<(String, String), TimeTable>, Error> {
    let df = read_csv(path)?;
    let froms = string_column(&df, "from")?;
    let tos = string_column(&df, "to")?;
    let weekday_times = string_column(&df, "weekday_times")?;
    let holiday_times = string_column(&df, "holiday_times")?;
    let weekday_names = string_column(&df, "weekday_name")?;
    let holiday_names = string_column(&df, "holiday_name")?;

    let mut out = HashMap::new();
    for (((((from, to), weekday), holiday), weekday_name), holiday_name) in froms
        .zip(tos)
        .zip(weekday_times)
        .zip(holiday_times)
        .zip(weekday_names)
        .zip(holiday_names)
    {
        out.insert(
            (from.to_string(), to.to_string()),
            TimeTable {
                weekday_times: split_times(weekday),
                holiday_times: split_times(holiday),
                weekday_name: weekday_name.to_string(),
                holiday_name: holiday_name.to_string(),
            },
        );
    }
    Ok(out)
}

/// Loads the pre-joined stop-to-stop polyline table (spec 6 `gtfs.shapes`),
/// grounded on `original_source/prometheus/ptrans/ptrans_searcher.py::_load_shape_dict`.
fn load_gtfs_shapes(path: &Path) -> Result<HashMap<(String, String), String>, Error> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let df = read_csv(path)?;
    let froms = string_column(&df, "from")?;
    let tos = string_column(&df, "to")?;
    let polylines = string_column(&df, "polyline")?;

    Ok(froms
        .zip(tos)
        .zip(polylines)
        .map(|((from, to), polyline)| ((from.to_string(), to.to_string()), polyline.to_string()))
        .collect())
}

fn index_isochrone_dir(dir: &Path) -> Result<Vec<IsochroneFileKey>, Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(key) = parse_isochrone_filename(&entry.path()) {
            out.push(key);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isochrone_filename_parses_four_underscore_fields() {
        let key = parse_isochrone_filename(Path::new("/data/iso/hosp1_40_800_1000.json")).unwrap();
        assert_eq!(key.spot_id, "hosp1");
        assert_eq!(key.minute, 40);
        assert_eq!(key.walk, 800);
        assert_eq!(key.start_time, "1000");
    }

    #[test]
    fn rejects_malformed_isochrone_filename() {
        assert!(parse_isochrone_filename(Path::new("/data/iso/not_enough_fields.json")).is_none());
    }
}
