//! Time-dependent shortest-path search over a [`TransitOverlay`] (spec 4.E
//! `search`). Cost is absolute arrival time in minutes since midnight, so
//! timetable lookup is a direct comparison and the search is classical
//! Dijkstra on a time-expanded graph compressed into one copy per stop
//! (spec 9 design note). Grounded on the teacher's
//! `algo::dijkstra::time_dependent_dijkstra` for the `BinaryHeap<MinScored<_>>`
//! shape, generalized with the wait and mode-pair penalties spec 4.E adds.

use std::collections::BinaryHeap;

use ahash::{HashMap, HashMapExt};

use super::graph::{EdgeKind, GOAL_NODE, START_NODE};
use super::overlay::TransitOverlay;
use crate::geo_primitives::hhmm_to_minutes;
use crate::util::MinScored;
use crate::Error;

/// Large sentinel added when a schedule has no future departure left in the
/// operating day, or when two consecutive hops are both WALK. Both are
/// large enough, relative to any realistic travel time, that the open
/// question in spec 9 holds: every relaxation weight stays non-negative, so
/// terminating on the first pop of `GOAL` is correct.
const WAIT_SENTINEL_MIN: i64 = 10_000;
const MODE_PAIR_PENALTY_MIN: i64 = 10_000;

/// The edge sequence and arrival time of a successful search, ready for
/// [`super::tracer::trace`].
pub struct SearchResult {
    pub path_node_ids: Vec<String>,
    pub arrival_time_min: i64,
}

pub(crate) fn next_departure_minutes(current_time_min: i64, times: &[String]) -> Result<Option<i64>, Error> {
    for t in times {
        let minute = hhmm_to_minutes(t)? as i64;
        if minute >= current_time_min {
            return Ok(Some(minute));
        }
    }
    Ok(None)
}

/// Runs the search from `START` to `GOAL` starting at `start_time_hhmm`.
/// Returns `Ok(None)` when no path reaches `GOAL` (spec: "Failure modes: no
/// path to GOAL returns null").
pub fn search(overlay: &TransitOverlay, start_time_hhmm: &str) -> Result<Option<SearchResult>, Error> {
    let start_time = hhmm_to_minutes(start_time_hhmm)? as i64;

    let mut best_arrival: HashMap<String, i64> = HashMap::new();
    let mut prev_nodes: HashMap<String, String> = HashMap::new();
    let mut heap: BinaryHeap<MinScored<(String, Option<EdgeKind>)>> = BinaryHeap::new();

    best_arrival.insert(START_NODE.to_string(), start_time);
    heap.push(MinScored(start_time as f64, (START_NODE.to_string(), None)));

    while let Some(MinScored(cost, (node, prev_mode))) = heap.pop() {
        let cost = cost.round() as i64;

        if node == GOAL_NODE {
            return Ok(Some(reconstruct(&prev_nodes, cost)));
        }
        if cost > *best_arrival.get(&node).unwrap_or(&i64::MAX) {
            continue;
        }

        for (to, edge) in overlay.out_edges(&node) {
            let mode = edge.kind();

            let wait = match edge.time_table() {
                Some(tt) => match next_departure_minutes(cost, &tt.weekday_times)? {
                    Some(departure) => departure - cost,
                    None => WAIT_SENTINEL_MIN,
                },
                None => 0,
            };

            let mode_pair_penalty =
                if prev_mode == Some(EdgeKind::Walk) && mode == EdgeKind::Walk {
                    MODE_PAIR_PENALTY_MIN
                } else {
                    0
                };

            let new_cost = cost + wait + edge.travel_time_min().round() as i64 + mode_pair_penalty;

            if new_cost < *best_arrival.get(to).unwrap_or(&i64::MAX) {
                best_arrival.insert(to.to_string(), new_cost);
                prev_nodes.insert(to.to_string(), node.clone());
                heap.push(MinScored(new_cost as f64, (to.to_string(), Some(mode))));
            }
        }
    }

    Ok(None)
}

fn reconstruct(prev_nodes: &HashMap<String, String>, arrival_time_min: i64) -> SearchResult {
    let mut path = vec![GOAL_NODE.to_string()];
    let mut cur = GOAL_NODE.to_string();
    while let Some(prev) = prev_nodes.get(&cur) {
        path.push(prev.clone());
        cur = prev.clone();
    }
    path.reverse();
    SearchResult { path_node_ids: path, arrival_time_min }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_primitives::Coord;
    use crate::transit::graph::{GraphEdge, TimeTable, TransitGraph, TransitNode};

    fn graph_with_bus_and_walk() -> TransitGraph {
        let mut g = TransitGraph::new();
        for id in ["a", "b", "c"] {
            g.add_node(TransitNode { node_id: id.into(), name: id.into(), coord: Coord::new(0.0, 0.0) });
        }
        g.add_edge(
            "a",
            "b",
            GraphEdge::Scheduled {
                kind: EdgeKind::Bus,
                travel_time_min: 10.0,
                time_table: TimeTable {
                    weekday_times: vec!["10:30".into(), "11:00".into()],
                    holiday_times: vec![],
                    weekday_name: "line 1".into(),
                    holiday_name: "line 1".into(),
                },
                polyline: None,
            },
        )
        .unwrap();
        g.add_edge("b", "c", GraphEdge::Walk { travel_time_min: 5.0 }).unwrap();
        g
    }

    #[test]
    fn search_waits_for_next_departure_and_reaches_goal() {
        let base = graph_with_bus_and_walk();
        let mut overlay = TransitOverlay::new(&base);
        overlay.add_anchors(
            Coord::new(0.0, 0.0),
            Coord::new(0.0, 0.0),
            &[("a".to_string(), 0.0)],
            &[("c".to_string(), 0.0)],
            30.0,
        );

        let result = search(&overlay, "10:00").unwrap().expect("path should exist");
        assert_eq!(result.path_node_ids.first().map(String::as_str), Some(START_NODE));
        assert_eq!(result.path_node_ids.last().map(String::as_str), Some(GOAL_NODE));
        // Waits until 10:30 departure, +10 min bus, +5 min walk = 10:45.
        assert_eq!(result.arrival_time_min, hhmm_to_minutes("10:45").unwrap() as i64);
    }

    #[test]
    fn no_path_to_goal_returns_none() {
        let base = graph_with_bus_and_walk();
        let overlay = TransitOverlay::new(&base);
        assert!(search(&overlay, "10:00").unwrap().is_none());
    }
}
