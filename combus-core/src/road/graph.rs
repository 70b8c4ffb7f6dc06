use std::path::Path;

use ahash::{HashMap, HashMapExt};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;

use crate::geo_primitives::{haversine_m, latlon_to_mesh, Coord};
use crate::Error;

/// An immutable road-network node.
#[derive(Debug, Clone, Copy)]
pub struct RoadNode {
    pub id: i64,
    pub coord: Coord,
    pub mesh_code: i64,
}

/// The road network, loaded once from a node CSV (`id, lat, lon`) and an
/// edge CSV (`from, to, distance`), as a directed weighted multigraph
/// represented by adjacency lists rather than a `petgraph` graph — the
/// teacher has no road-network concern to imitate here, so this mirrors the
/// dict-of-lists shape of `original_source/prometheus/car_searcher.py`
/// directly, generalized into owned Rust collections.
pub struct RoadGraph {
    nodes: HashMap<i64, RoadNode>,
    out_edges: HashMap<i64, Vec<(i64, f64)>>,
    edge_distance: HashMap<(i64, i64), f64>,
    mesh_index: HashMap<i64, Vec<(i64, Coord)>>,
}

fn read_csv(path: &Path) -> Result<DataFrame, Error> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .map_err(Error::from)
}

impl RoadGraph {
    pub fn load(nodes_path: &Path, edges_path: &Path) -> Result<Self, Error> {
        let nodes_df = read_csv(nodes_path)?;
        let edges_df = read_csv(edges_path)?;

        let mut nodes = HashMap::new();
        let mut mesh_index: HashMap<i64, Vec<(i64, Coord)>> = HashMap::new();

        let ids = nodes_df.column("id")?.cast(&DataType::Int64)?;
        let lats = nodes_df.column("lat")?.f64()?;
        let lons = nodes_df.column("lon")?.f64()?;

        for ((id, lat), lon) in ids.i64()?.iter().zip(lats.iter()).zip(lons.iter()) {
            let id = id.ok_or_else(|| Error::MissingValue("id".into()))?;
            let lat = lat.ok_or_else(|| Error::MissingValue("lat".into()))?;
            let lon = lon.ok_or_else(|| Error::MissingValue("lon".into()))?;
            let coord = Coord::new(lat, lon);
            let mesh_code = latlon_to_mesh(coord);

            nodes.insert(id, RoadNode { id, coord, mesh_code });
            mesh_index.entry(mesh_code).or_default().push((id, coord));
        }

        let mut out_edges: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
        let mut edge_distance = HashMap::new();

        let froms = edges_df.column("from")?.cast(&DataType::Int64)?;
        let tos = edges_df.column("to")?.cast(&DataType::Int64)?;
        let distances = edges_df.column("distance")?.f64()?;

        for ((from, to), distance) in froms.i64()?.iter().zip(tos.i64()?.iter()).zip(distances.iter()) {
            let from = from.ok_or_else(|| Error::MissingValue("from".into()))?;
            let to = to.ok_or_else(|| Error::MissingValue("to".into()))?;
            let distance = distance.ok_or_else(|| Error::MissingValue("distance".into()))?;

            if !nodes.contains_key(&from) {
                return Err(Error::NodeNotFound(from.to_string()));
            }
            if !nodes.contains_key(&to) {
                return Err(Error::NodeNotFound(to.to_string()));
            }
            if distance < 0.0 {
                return Err(Error::NegativeWeight(format!("{from} -> {to}")));
            }

            out_edges.entry(from).or_default().push((to, distance));
            edge_distance.insert((from, to), distance);
        }

        Ok(Self { nodes, out_edges, edge_distance, mesh_index })
    }

    pub fn node(&self, id: i64) -> Option<&RoadNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn neighbours(&self, id: i64) -> &[(i64, f64)] {
        self.out_edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn edge_distance(&self, from: i64, to: i64) -> Option<f64> {
        self.edge_distance.get(&(from, to)).copied()
    }

    #[cfg(test)]
    pub(crate) fn from_edges(n: i64, edges: &[(i64, i64, f64)]) -> Self {
        let mut nodes = HashMap::new();
        let mut mesh_index: HashMap<i64, Vec<(i64, Coord)>> = HashMap::new();
        for id in 0..n {
            let coord = Coord::new(36.0 + id as f64 * 0.001, 137.0);
            let mesh_code = latlon_to_mesh(coord);
            nodes.insert(id, RoadNode { id, coord, mesh_code });
            mesh_index.entry(mesh_code).or_default().push((id, coord));
        }
        let mut out_edges: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
        let mut edge_distance = HashMap::new();
        for &(from, to, w) in edges {
            out_edges.entry(from).or_default().push((to, w));
            edge_distance.insert((from, to), w);
        }
        Self { nodes, out_edges, edge_distance, mesh_index }
    }

    /// Resolves a coordinate to the nearest road node by scanning only the
    /// candidates in its own mesh bucket (spec 4.C `find_nearest`).
    pub fn find_nearest(&self, coord: Coord) -> Result<i64, Error> {
        let mesh_code = latlon_to_mesh(coord);
        let bucket = self.mesh_index.get(&mesh_code).ok_or_else(|| {
            Error::MalformedInput(format!("no road nodes in mesh {mesh_code} for {coord:?}"))
        })?;
        if bucket.is_empty() {
            return Err(Error::MalformedInput(format!(
                "empty mesh bucket {mesh_code} for {coord:?}"
            )));
        }

        bucket
            .iter()
            .min_by(|(_, a), (_, b)| {
                haversine_m(coord, *a)
                    .partial_cmp(&haversine_m(coord, *b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::MalformedInput(format!("no nearest node for {coord:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> RoadGraph {
        let mut nodes = HashMap::new();
        let mut mesh_index: HashMap<i64, Vec<(i64, Coord)>> = HashMap::new();
        for (id, lat, lon) in [(1i64, 36.0, 137.0), (2, 36.001, 137.001), (3, 36.1, 137.1)] {
            let coord = Coord::new(lat, lon);
            let mesh = latlon_to_mesh(coord);
            nodes.insert(id, RoadNode { id, coord, mesh_code: mesh });
            mesh_index.entry(mesh).or_default().push((id, coord));
        }
        let mut out_edges: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
        let mut edge_distance = HashMap::new();
        for (from, to, d) in [(1i64, 2i64, 100.0f64), (2, 1, 100.0), (2, 3, 500.0), (3, 2, 500.0)] {
            out_edges.entry(from).or_default().push((to, d));
            edge_distance.insert((from, to), d);
        }
        RoadGraph { nodes, out_edges, edge_distance, mesh_index }
    }

    #[test]
    fn finds_nearest_node_in_same_mesh() {
        let g = sample_graph();
        let nearest = g.find_nearest(Coord::new(36.0001, 137.0001)).unwrap();
        assert_eq!(nearest, 1);
    }

    #[test]
    fn missing_mesh_bucket_errors() {
        let g = sample_graph();
        assert!(g.find_nearest(Coord::new(0.0, 0.0)).is_err());
    }
}
