use ahash::{HashMap, HashMapExt};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::geo_primitives::Coord;
use crate::Error;

/// `kind ∈ {WALK, BUS, COMBUS}` (spec 3 `TransitEdge`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Walk,
    Bus,
    Combus,
}

/// `(weekday_times, holiday_times, weekday_name, holiday_name)`; each times
/// list is strictly ascending `HH:MM` within one operating day (spec 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeTable {
    pub weekday_times: Vec<String>,
    pub holiday_times: Vec<String>,
    pub weekday_name: String,
    pub holiday_name: String,
}

/// A directed multigraph edge. Walk edges have no schedule (their cost is
/// the raw travel time); bus/combus edges carry a timetable and pay a wait
/// penalty at search time (spec 4.E). Grounded on the teacher's
/// `graph::GraphEdge`/`TransitEdge`, replacing its GTFS-trip binary search
/// (many trips per stop pair) with the spec's single average-travel-time
/// edge plus an explicit `TimeTable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphEdge {
    Walk { travel_time_min: f64 },
    Scheduled { kind: EdgeKind, travel_time_min: f64, time_table: TimeTable, polyline: Option<String> },
}

impl GraphEdge {
    pub fn kind(&self) -> EdgeKind {
        match self {
            GraphEdge::Walk { .. } => EdgeKind::Walk,
            GraphEdge::Scheduled { kind, .. } => *kind,
        }
    }

    pub fn travel_time_min(&self) -> f64 {
        match self {
            GraphEdge::Walk { travel_time_min } => *travel_time_min,
            GraphEdge::Scheduled { travel_time_min, .. } => *travel_time_min,
        }
    }

    pub fn time_table(&self) -> Option<&TimeTable> {
        match self {
            GraphEdge::Walk { .. } => None,
            GraphEdge::Scheduled { time_table, .. } => Some(time_table),
        }
    }

    /// The traced geometry for this edge, if one was loaded alongside it
    /// (combus edges always carry one; bus edges do only when the GTFS
    /// shapes table has a matching row). Absent for plain walk edges, whose
    /// geometry the tracer synthesises as a straight segment between
    /// endpoint coordinates.
    pub fn polyline(&self) -> Option<&str> {
        match self {
            GraphEdge::Walk { .. } => None,
            GraphEdge::Scheduled { polyline, .. } => polyline.as_deref(),
        }
    }
}

/// `(node_id, name, coord)` (spec 3 `TransitNode`). `node_id` is the domain
/// key: a GTFS stop id, a minted combus id, or the reserved sentinels
/// `"START"`/`"GOAL"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitNode {
    pub node_id: String,
    pub name: String,
    pub coord: Coord,
}

pub const START_NODE: &str = "START";
pub const GOAL_NODE: &str = "GOAL";

/// The immutable, process-wide walk/bus multigraph (spec 4.E "Load"). Per-
/// request combus/anchor additions live in [`super::overlay::TransitOverlay`]
/// rather than mutating this graph, so one instance is safely shared
/// read-only across every worker (spec 5).
pub struct TransitGraph {
    graph: DiGraph<TransitNode, GraphEdge>,
    index_by_id: HashMap<String, NodeIndex>,
}

impl TransitGraph {
    pub fn new() -> Self {
        Self { graph: DiGraph::new(), index_by_id: HashMap::new() }
    }

    pub fn add_node(&mut self, node: TransitNode) -> NodeIndex {
        let id = node.node_id.clone();
        let idx = self.graph.add_node(node);
        self.index_by_id.insert(id, idx);
        idx
    }

    pub fn add_edge(&mut self, from: &str, to: &str, edge: GraphEdge) -> Result<(), Error> {
        let from_idx = self.index(from)?;
        let to_idx = self.index(to)?;
        self.graph.add_edge(from_idx, to_idx, edge);
        Ok(())
    }

    pub fn index(&self, node_id: &str) -> Result<NodeIndex, Error> {
        self.index_by_id
            .get(node_id)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    pub fn node(&self, node_id: &str) -> Option<&TransitNode> {
        self.index_by_id.get(node_id).map(|&idx| &self.graph[idx])
    }

    pub fn node_by_index(&self, idx: NodeIndex) -> &TransitNode {
        &self.graph[idx]
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index_by_id.contains_key(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TransitNode> {
        self.graph.node_weights()
    }

    /// Outgoing `(dst_node_id, edge)` pairs for `from`, empty if unknown —
    /// callers that also consult a per-request overlay treat "unknown here"
    /// as "check the overlay next" rather than an error.
    pub fn out_edges(&self, from: &str) -> Vec<(&str, &GraphEdge)> {
        let Some(&idx) = self.index_by_id.get(from) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, petgraph::Direction::Outgoing)
            .map(|e| (self.graph[e.target()].node_id.as_str(), e.weight()))
            .collect()
    }
}

impl Default for TransitGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_traverse_edge() {
        let mut g = TransitGraph::new();
        g.add_node(TransitNode { node_id: "a".into(), name: "A".into(), coord: Coord::new(0.0, 0.0) });
        g.add_node(TransitNode { node_id: "b".into(), name: "B".into(), coord: Coord::new(1.0, 1.0) });
        g.add_edge("a", "b", GraphEdge::Walk { travel_time_min: 5.0 }).unwrap();

        let out = g.out_edges("a");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "b");
        assert_eq!(out[0].1.travel_time_min(), 5.0);
    }

    #[test]
    fn unknown_edge_target_errors() {
        let mut g = TransitGraph::new();
        g.add_node(TransitNode { node_id: "a".into(), name: "A".into(), coord: Coord::new(0.0, 0.0) });
        assert!(g.add_edge("a", "missing", GraphEdge::Walk { travel_time_min: 1.0 }).is_err());
    }
}
