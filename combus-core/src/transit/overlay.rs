//! Per-request mutable overlay atop the immutable [`super::TransitGraph`]
//! (spec 4.E combus/anchor injection, spec 5 concurrency model, spec 9
//! design note "cyclic graph with transient nodes").
//!
//! Rather than mutate the shared graph and serialise every request behind a
//! lock (the reference design's `clear()`-sweep strategy), each request owns
//! a thin overlay of additions; an [`OverlayGuard`] drops it at scope exit,
//! making the shadow-key cleanup implicit instead of an explicit sweep —
//! the behavioural contract (spec invariant 4) is unchanged either way.

use ahash::{HashMap, HashMapExt};

use crate::combus_bridge::{CombusBridgeOutput, CombusEdge as BridgeCombusEdge};
use crate::geo_primitives::haversine_m;
use crate::transit::graph::{EdgeKind, GraphEdge, TimeTable, TransitGraph, TransitNode, GOAL_NODE, START_NODE};
use crate::Error;

/// A per-request overlay of additions on top of an immutable `TransitGraph`.
/// Every id it introduces is recorded in `shadow_keys`, mirroring the
/// reference design's shadow-key ledger even though cleanup here is really
/// just dropping this value.
pub struct TransitOverlay<'a> {
    base: &'a TransitGraph,
    extra_nodes: HashMap<String, TransitNode>,
    extra_out: HashMap<String, Vec<(String, GraphEdge)>>,
    shadow_keys: Vec<String>,
}

impl<'a> TransitOverlay<'a> {
    pub fn new(base: &'a TransitGraph) -> Self {
        Self { base, extra_nodes: HashMap::new(), extra_out: HashMap::new(), shadow_keys: Vec::new() }
    }

    fn push_node(&mut self, node: TransitNode) {
        self.shadow_keys.push(node.node_id.clone());
        self.extra_nodes.insert(node.node_id.clone(), node);
    }

    fn push_edge(&mut self, from: &str, to: &str, edge: GraphEdge) {
        self.extra_out.entry(from.to_string()).or_default().push((to.to_string(), edge));
    }

    pub fn node(&self, node_id: &str) -> Option<&TransitNode> {
        self.extra_nodes.get(node_id).or_else(|| self.base.node(node_id))
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.extra_nodes.contains_key(node_id) || self.base.contains(node_id)
    }

    /// Outgoing edges visible from `from`: the base graph's own edges plus
    /// whatever this overlay has injected.
    pub fn out_edges(&self, from: &str) -> Vec<(&str, &GraphEdge)> {
        let mut out = self.base.out_edges(from);
        if let Some(extra) = self.extra_out.get(from) {
            out.extend(extra.iter().map(|(to, edge)| (to.as_str(), edge)));
        }
        out
    }

    /// Injects combus nodes, single/multi-leg combus edges, and walk edges
    /// from every combus node to every existing transit node within
    /// `walk_threshold_min` minutes at `walk_speed_m_per_min` (spec 4.E
    /// `add_combus`).
    pub fn add_combus(
        &mut self,
        bridge_output: &CombusBridgeOutput,
        walk_speed_m_per_min: f64,
        walk_threshold_min: f64,
    ) {
        for node in &bridge_output.nodes {
            self.push_node(TransitNode {
                node_id: node.id.clone(),
                name: node.name.clone(),
                coord: node.coord,
            });
        }

        for edge in &bridge_output.edges {
            self.push_edge(&edge.from, &edge.to, combus_graph_edge(edge));
        }

        let combus_coords: Vec<(String, crate::geo_primitives::Coord)> =
            bridge_output.nodes.iter().map(|n| (n.id.clone(), n.coord)).collect();
        let existing: Vec<(String, crate::geo_primitives::Coord)> =
            self.base.nodes().map(|n| (n.node_id.clone(), n.coord)).collect();

        for (combus_id, combus_coord) in &combus_coords {
            for (other_id, other_coord) in &existing {
                let walk_min = haversine_m(*combus_coord, *other_coord) / walk_speed_m_per_min;
                if walk_min < walk_threshold_min {
                    self.push_edge(combus_id, other_id, GraphEdge::Walk { travel_time_min: walk_min });
                    self.push_edge(other_id, combus_id, GraphEdge::Walk { travel_time_min: walk_min });
                }
            }
        }
    }

    /// Inserts `START`/`GOAL` sentinels with walk edges to/from the given
    /// candidate `(node_id, distance_m)` pairs (spec 4.E `add_anchors`).
    pub fn add_anchors(
        &mut self,
        start_coord: crate::geo_primitives::Coord,
        goal_coord: crate::geo_primitives::Coord,
        start_candidates: &[(String, f64)],
        goal_candidates: &[(String, f64)],
        walk_speed_m_per_min: f64,
    ) {
        self.push_node(TransitNode {
            node_id: START_NODE.to_string(),
            name: START_NODE.to_string(),
            coord: start_coord,
        });
        self.push_node(TransitNode {
            node_id: GOAL_NODE.to_string(),
            name: GOAL_NODE.to_string(),
            coord: goal_coord,
        });

        for (node_id, distance_m) in start_candidates {
            let travel_time_min = distance_m / walk_speed_m_per_min;
            self.push_edge(START_NODE, node_id, GraphEdge::Walk { travel_time_min });
        }
        for (node_id, distance_m) in goal_candidates {
            let travel_time_min = distance_m / walk_speed_m_per_min;
            self.push_edge(node_id, GOAL_NODE, GraphEdge::Walk { travel_time_min });
        }
    }

    pub fn shadow_keys(&self) -> &[String] {
        &self.shadow_keys
    }
}

fn combus_graph_edge(edge: &BridgeCombusEdge) -> GraphEdge {
    GraphEdge::Scheduled {
        kind: EdgeKind::Combus,
        travel_time_min: edge.duration_min as f64,
        time_table: TimeTable {
            weekday_times: edge.time_table_weekday.clone(),
            holiday_times: edge.time_table_holiday.clone(),
            weekday_name: edge.display_name.clone(),
            holiday_name: edge.display_name.clone(),
        },
        polyline: Some(edge.polyline.clone()),
    }
}

/// RAII guard ensuring an overlay's additions are dropped on every exit path
/// — success, error, or cancellation (spec 5 "Implementations SHOULD wrap
/// every mutating path in a scoped resource that guarantees `clear()` runs
/// on any exit").
pub struct OverlayGuard<'a> {
    overlay: Option<TransitOverlay<'a>>,
}

impl<'a> OverlayGuard<'a> {
    pub fn new(base: &'a TransitGraph) -> Self {
        Self { overlay: Some(TransitOverlay::new(base)) }
    }

    pub fn overlay(&mut self) -> &mut TransitOverlay<'a> {
        self.overlay.as_mut().expect("overlay taken before guard dropped")
    }

    /// Explicit cleanup, mirroring the reference design's `clear()`. Safe to
    /// call more than once; `Drop` calls it again if the caller didn't.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.overlay = None;
        Ok(())
    }
}

impl Drop for OverlayGuard<'_> {
    fn drop(&mut self) {
        self.overlay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_primitives::Coord;

    fn base_graph() -> TransitGraph {
        let mut g = TransitGraph::new();
        g.add_node(TransitNode { node_id: "s1".into(), name: "Stop 1".into(), coord: Coord::new(36.0, 137.0) });
        g
    }

    #[test]
    fn overlay_additions_vanish_after_guard_drop() {
        let base = base_graph();
        {
            let mut guard = OverlayGuard::new(&base);
            guard.overlay().add_anchors(
                Coord::new(36.0, 137.0),
                Coord::new(36.1, 137.1),
                &[("s1".to_string(), 100.0)],
                &[],
                30.0,
            );
            assert!(guard.overlay().contains(START_NODE));
        }
        // Base graph itself was never mutated — the idempotence invariant
        // holds trivially because overlay state never touched `base`.
        assert!(!base.contains(START_NODE));
    }
}
