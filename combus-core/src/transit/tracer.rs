//! Itinerary tracer (spec 4.E `trace`): walks a search's node sequence and
//! emits a timed, segmented [`Route`] with one [`RouteSection`] per edge.
//!
//! Grounded on the teacher's `algo::itinerary::segment::{Segment, Itinerary}`
//! for the segment-per-edge / running-time shape (`calculate_itinerary`,
//! `Itinerary::combined_geometry`'s duplicate-join handling), generalized
//! from the teacher's binary-search-over-sorted-trips lookup to this
//! engine's single-timetable-per-edge `next_departure_minutes`.

use super::graph::EdgeKind;
use super::overlay::TransitOverlay;
use super::search::next_departure_minutes;
use crate::geo_primitives::{decode_polyline, encode_polyline, haversine_m, Coord};
use crate::Error;

const WALK_DISPLAY_NAME: &str = "徒歩";

/// One mode-tagged leg of a traced route (spec 3 `RouteSection`).
#[derive(Debug, Clone)]
pub struct RouteSection {
    pub mode: EdgeKind,
    pub from_node: String,
    pub to_node: String,
    pub from_name: String,
    pub to_name: String,
    pub start_time_min: i64,
    pub goal_time_min: i64,
    pub duration_min: i64,
    pub distance_m: f64,
    pub polyline: String,
    pub display_name: String,
}

/// A traced itinerary: sections plus aggregate totals (spec 3 `Route`).
#[derive(Debug, Clone)]
pub struct Route {
    pub sections: Vec<RouteSection>,
    pub start_time_min: i64,
    pub goal_time_min: i64,
    pub total_duration_min: i64,
    pub total_distance_m: f64,
    pub walk_distance_m: f64,
    pub spot_list: Vec<String>,
}

fn straight_line_polyline(a: Coord, b: Coord) -> String {
    encode_polyline(&[a, b])
}

fn polyline_distance_m(polyline: &str) -> f64 {
    let coords = decode_polyline(polyline);
    coords.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

/// Walks `path_node_ids` (as returned by [`super::search::search`]) and
/// produces the timed section list, starting the clock at `start_time_min`.
pub fn trace(
    overlay: &TransitOverlay,
    path_node_ids: &[String],
    start_time_min: i64,
) -> Result<Route, Error> {
    let mut sections = Vec::with_capacity(path_node_ids.len().saturating_sub(1));
    let mut current_time = start_time_min;

    for window in path_node_ids.windows(2) {
        let (from, to) = (window[0].as_str(), window[1].as_str());
        let edge = overlay
            .out_edges(from)
            .into_iter()
            .find(|(candidate, _)| *candidate == to)
            .map(|(_, edge)| edge)
            .ok_or_else(|| Error::NoTransitPath { from: from.to_string(), to: to.to_string() })?;

        let from_node = overlay.node(from).ok_or_else(|| Error::NodeNotFound(from.to_string()))?;
        let to_node = overlay.node(to).ok_or_else(|| Error::NodeNotFound(to.to_string()))?;

        let (start_time_min, duration_min, display_name) = match edge.kind() {
            EdgeKind::Walk => {
                let duration = (edge.travel_time_min().round() as i64).max(1);
                (current_time, duration, WALK_DISPLAY_NAME.to_string())
            }
            EdgeKind::Bus | EdgeKind::Combus => {
                let time_table = edge
                    .time_table()
                    .ok_or_else(|| Error::NoTransitPath { from: from.to_string(), to: to.to_string() })?;
                let departure = next_departure_minutes(current_time, &time_table.weekday_times)?
                    .ok_or_else(|| Error::LastBusMissed { from: from.to_string(), to: to.to_string() })?;
                (departure, edge.travel_time_min().round() as i64, time_table.weekday_name.clone())
            }
        };

        let polyline = edge
            .polyline()
            .map(str::to_string)
            .unwrap_or_else(|| straight_line_polyline(from_node.coord, to_node.coord));
        let distance_m = polyline_distance_m(&polyline);
        let goal_time_min = start_time_min + duration_min;

        sections.push(RouteSection {
            mode: edge.kind(),
            from_node: from.to_string(),
            to_node: to.to_string(),
            from_name: from_node.name.clone(),
            to_name: to_node.name.clone(),
            start_time_min,
            goal_time_min,
            duration_min,
            distance_m,
            polyline,
            display_name,
        });

        current_time = goal_time_min;
    }

    let total_distance_m = sections.iter().map(|s| s.distance_m).sum();
    let walk_distance_m = sections.iter().filter(|s| s.mode == EdgeKind::Walk).map(|s| s.distance_m).sum();
    let start_time_min = sections.first().map(|s| s.start_time_min).unwrap_or(start_time_min);
    let goal_time_min = sections.last().map(|s| s.goal_time_min).unwrap_or(start_time_min);

    Ok(Route {
        sections,
        start_time_min,
        goal_time_min,
        total_duration_min: goal_time_min - start_time_min,
        total_distance_m,
        walk_distance_m,
        spot_list: path_node_ids.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_primitives::hhmm_to_minutes;
    use crate::transit::graph::{GraphEdge, TimeTable, TransitGraph, TransitNode};
    use crate::transit::overlay::TransitOverlay;

    fn graph_with_bus_and_walk() -> TransitGraph {
        let mut g = TransitGraph::new();
        g.add_node(TransitNode { node_id: "a".into(), name: "A".into(), coord: Coord::new(36.0, 137.0) });
        g.add_node(TransitNode { node_id: "b".into(), name: "B".into(), coord: Coord::new(36.01, 137.0) });
        g.add_node(TransitNode { node_id: "c".into(), name: "C".into(), coord: Coord::new(36.02, 137.0) });
        g.add_edge(
            "a",
            "b",
            GraphEdge::Scheduled {
                kind: EdgeKind::Bus,
                travel_time_min: 10.0,
                time_table: TimeTable {
                    weekday_times: vec!["10:30".into()],
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
    fn traces_a_walk_then_bus_itinerary_with_wait() {
        let base = graph_with_bus_and_walk();
        let overlay = TransitOverlay::new(&base);
        let path = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let start = hhmm_to_minutes("10:00").unwrap() as i64;

        let route = trace(&overlay, &path, start).unwrap();
        assert_eq!(route.sections.len(), 2);
        assert_eq!(route.sections[0].mode, EdgeKind::Bus);
        assert_eq!(route.sections[0].start_time_min, hhmm_to_minutes("10:30").unwrap() as i64);
        assert_eq!(route.sections[1].mode, EdgeKind::Walk);
        assert_eq!(route.goal_time_min, hhmm_to_minutes("10:45").unwrap() as i64);
    }

    #[test]
    fn missing_edge_between_consecutive_nodes_errors() {
        let base = graph_with_bus_and_walk();
        let overlay = TransitOverlay::new(&base);
        let path = vec!["a".to_string(), "c".to_string()];
        assert!(trace(&overlay, &path, 600).is_err());
    }
}
