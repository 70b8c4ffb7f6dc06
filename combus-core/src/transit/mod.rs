//! Component E, the Public-Transit Engine (spec 4.E): a fused walk/bus
//! multigraph plus the overlay, search, nearest-stop index, and itinerary
//! tracer that operate over it.

pub mod connectors;
pub mod graph;
pub mod overlay;
pub mod search;
pub mod tracer;

pub use connectors::StopIndex;
pub use graph::{EdgeKind, GraphEdge, TimeTable, TransitGraph, TransitNode, GOAL_NODE, START_NODE};
pub use overlay::{OverlayGuard, TransitOverlay};
pub use search::{search as find_path, SearchResult};
pub use tracer::{trace, Route, RouteSection};

use crate::data_accessor::DataAccessor;
use crate::config::Config;
use crate::Error;

impl TransitGraph {
    /// Builds the process-wide walk/bus multigraph from the pre-joined GTFS
    /// tables (spec 4.E "Load"; Non-goal "no GTFS parsing" means this reads
    /// an already-averaged travel-time table rather than `stop_times.txt`).
    /// Grounded on the teacher's `loaders::build_graph`, which likewise folds
    /// a flat edge table into a `DiGraph` in one pass.
    pub fn load(config: &Config, accessor: &DataAccessor) -> Result<Self, Error> {
        let mut graph = TransitGraph::new();

        for stop in accessor.gtfs_stops() {
            graph.add_node(TransitNode {
                node_id: stop.stop_id.clone(),
                name: stop.name.clone(),
                coord: stop.coord,
            });
        }

        for (from, to, minutes) in accessor.gtfs_average_travel_times() {
            let time_table = accessor
                .gtfs_time_table(from, to)
                .cloned()
                .unwrap_or(TimeTable {
                    weekday_times: Vec::new(),
                    holiday_times: Vec::new(),
                    weekday_name: String::new(),
                    holiday_name: String::new(),
                });
            graph.add_edge(
                from,
                to,
                GraphEdge::Scheduled {
                    kind: EdgeKind::Bus,
                    travel_time_min: minutes,
                    time_table,
                    polyline: accessor.gtfs_shape(from, to).map(str::to_string),
                },
            )?;
        }

        let stops: Vec<&TransitNode> = graph.nodes().collect();
        let mut walk_edges = Vec::new();
        for (i, a) in stops.iter().enumerate() {
            for b in stops.iter().skip(i + 1) {
                let walk_min =
                    crate::geo_primitives::haversine_m(a.coord, b.coord) / config.walk_speed_m_per_min;
                if walk_min < config.walk_edge_threshold_min {
                    walk_edges.push((a.node_id.clone(), b.node_id.clone(), walk_min));
                }
            }
        }
        for (a, b, walk_min) in walk_edges {
            graph.add_edge(&a, &b, GraphEdge::Walk { travel_time_min: walk_min })?;
            graph.add_edge(&b, &a, GraphEdge::Walk { travel_time_min: walk_min })?;
        }

        Ok(graph)
    }
}
