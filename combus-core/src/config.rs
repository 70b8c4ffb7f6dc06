//! Process-wide configuration (ambient stack, section 10 of the design spec).
//!
//! The teacher hardcodes its demo data paths directly in `cascade-bin/src/main.rs`.
//! Here they are factored into a `Config` loaded once at startup, either from
//! environment variables or (since `serde` is already part of the dependency
//! stack for GeoJSON) from a JSON file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geo_primitives::{CIRCUIT_COUNT, WALK_SPEED_M_PER_MIN};
use crate::Error;

/// Paths to every static resource the [`crate::data_accessor::DataAccessor`]
/// loads, plus the tunable constants named throughout the design spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub road_nodes_path: PathBuf,
    pub road_edges_path: PathBuf,
    pub gtfs_dir: PathBuf,
    pub gtfs_shapes_path: PathBuf,
    pub spot_list_path: PathBuf,
    pub combus_stops_path: PathBuf,
    pub combus_routes_path: PathBuf,
    pub ref_points_path: PathBuf,
    pub spot_to_spot_summary_path: PathBuf,
    pub mesh_path: PathBuf,
    pub best_combus_stop_sequences_path: PathBuf,
    pub isochrone_dir: PathBuf,
    pub route_cache_dir: PathBuf,

    #[serde(default = "default_walk_speed")]
    pub walk_speed_m_per_min: f64,
    #[serde(default = "default_circuit_count")]
    pub circuit_count: usize,
    #[serde(default = "default_max_walk_minutes")]
    pub walk_edge_threshold_min: f64,
}

fn default_walk_speed() -> f64 {
    WALK_SPEED_M_PER_MIN
}

fn default_circuit_count() -> usize {
    CIRCUIT_COUNT
}

fn default_max_walk_minutes() -> f64 {
    10.0
}

impl Config {
    /// Reads every `COMBUS_*` path from the environment; missing variables
    /// fall back to `./data/<name>` so a fresh checkout has a sane default.
    pub fn from_env() -> Result<Self, Error> {
        let data_dir = std::env::var("COMBUS_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let path_var = |name: &str, default_rel: &str| -> PathBuf {
            std::env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(&data_dir).join(default_rel))
        };

        Ok(Self {
            road_nodes_path: path_var("COMBUS_ROAD_NODES", "road/nodes.csv"),
            road_edges_path: path_var("COMBUS_ROAD_EDGES", "road/edges.csv"),
            gtfs_dir: path_var("COMBUS_GTFS_DIR", "gtfs"),
            gtfs_shapes_path: path_var("COMBUS_GTFS_SHAPES", "gtfs/shapes.csv"),
            spot_list_path: path_var("COMBUS_SPOT_LIST", "spot_list.csv"),
            combus_stops_path: path_var("COMBUS_STOPS", "combus_stops.csv"),
            combus_routes_path: path_var("COMBUS_ROUTES", "combus_routes.csv"),
            ref_points_path: path_var("COMBUS_REF_POINTS", "ref_points.csv"),
            spot_to_spot_summary_path: path_var(
                "COMBUS_SPOT_TO_SPOT_SUMMARY",
                "spot_to_spot_summary.csv",
            ),
            mesh_path: path_var("COMBUS_MESH", "mesh.csv"),
            best_combus_stop_sequences_path: path_var(
                "COMBUS_BEST_STOP_SEQUENCES",
                "best_combus_stop_sequences.json",
            ),
            isochrone_dir: path_var("COMBUS_ISOCHRONE_DIR", "isochrones"),
            route_cache_dir: path_var("COMBUS_ROUTE_CACHE_DIR", "routes"),
            walk_speed_m_per_min: default_walk_speed(),
            circuit_count: default_circuit_count(),
            walk_edge_threshold_min: default_max_walk_minutes(),
        })
    }

    /// Loads a config from a JSON file, for deployments that prefer a
    /// checked-in file over environment variables.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidData(format!("invalid config JSON: {e}")))
    }
}
