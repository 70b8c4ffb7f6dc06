//! Road-network routing engine (component C): mesh-indexed nearest-node
//! lookup, constrained successive Dijkstra with visit-exclusion, geometry
//! tracing and cyclic timetable synthesis.

mod dijkstra;
mod graph;
mod timetable;

pub use dijkstra::{constrained_dijkstra, find_route_through};
pub use graph::{RoadGraph, RoadNode};
pub use timetable::departure_matrix;

use serde::{Deserialize, Serialize};

use crate::geo_primitives::Coord;
use crate::Error;

/// A road-network leg: distance, duration (rounded half-away-from-zero at a
/// fixed 40 km/h) and the traced geometry as an encoded polyline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub distance_m: f64,
    pub duration_min: i64,
    pub polyline: String,
}

/// Fixed cruising speed used to derive a `Section`'s duration from distance.
pub const ROAD_SPEED_KMH: f64 = 40.0;

pub(crate) fn duration_from_distance_m(distance_m: f64) -> i64 {
    let speed_m_per_min = ROAD_SPEED_KMH * 1000.0 / 60.0;
    crate::geo_primitives::round_half_away_from_zero(distance_m / speed_m_per_min)
}

/// A named anchor the caller wants the combus loop to visit, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    pub coord: Coord,
}

/// One stop's place in a finished `CarRoute`: a fixed one-minute dwell and
/// the circuit departure times synthesised for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopEntry {
    pub stop: Stop,
    pub stay_time_min: u32,
    pub departure_times: Vec<String>,
}

/// The finished circular route: `sections[i]` connects `stops[i]` to
/// `stops[(i + 1) % n]`, so `|sections| == |stops|`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarRoute {
    pub total_distance_m: f64,
    pub total_duration_min: i64,
    pub stops: Vec<StopEntry>,
    pub sections: Vec<Section>,
}

const STAY_TIME_MIN: i64 = 1;

/// Builds a complete `CarRoute` from a road graph and an ordered list of
/// user-supplied stops: resolves each stop to its nearest road node, stitches
/// the cyclic loop (closing back to the first stop), and synthesises the
/// per-stop departure timetable.
pub fn plan_car_route(graph: &RoadGraph, stops: &[Stop], start_time_hhmm: &str) -> Result<CarRoute, Error> {
    if stops.is_empty() {
        return Err(Error::MalformedInput("combus route needs at least one stop".into()));
    }

    let mut nearest_nodes: Vec<i64> =
        stops.iter().map(|s| graph.find_nearest(s.coord)).collect::<Result<_, _>>()?;
    nearest_nodes.push(nearest_nodes[0]);

    let legs = find_route_through(graph, &nearest_nodes)?;
    let sections: Vec<Section> = legs.into_iter().map(|(_, section)| section).collect();

    let total_distance_m = sections.iter().map(|s| s.distance_m).sum();
    let total_duration_min: i64 =
        sections.iter().map(|s| s.duration_min).sum::<i64>() + stops.len() as i64 * STAY_TIME_MIN;

    let matrix = departure_matrix(&sections, STAY_TIME_MIN, start_time_hhmm)?;

    let stop_entries = stops
        .iter()
        .cloned()
        .zip(matrix)
        .map(|(stop, departure_times)| StopEntry {
            stop,
            stay_time_min: STAY_TIME_MIN as u32,
            departure_times,
        })
        .collect();

    Ok(CarRoute { total_distance_m, total_duration_min, stops: stop_entries, sections })
}

#[cfg(test)]
mod plan_tests {
    use super::*;

    #[test]
    fn plans_a_circular_route_with_matching_section_and_stop_counts() {
        let graph = RoadGraph::from_edges(
            4,
            &[
                (0, 1, 100.0), (1, 0, 100.0),
                (1, 2, 100.0), (2, 1, 100.0),
                (2, 3, 100.0), (3, 2, 100.0),
                (3, 0, 100.0), (0, 3, 100.0),
            ],
        );
        let stops = vec![
            Stop { name: "a".into(), coord: Coord::new(36.0, 137.0) },
            Stop { name: "b".into(), coord: Coord::new(36.001, 137.0) },
            Stop { name: "c".into(), coord: Coord::new(36.002, 137.0) },
            Stop { name: "d".into(), coord: Coord::new(36.003, 137.0) },
        ];
        let route = plan_car_route(&graph, &stops, "10:00").unwrap();
        assert_eq!(route.sections.len(), route.stops.len());
        for entry in &route.stops {
            assert_eq!(entry.departure_times.len(), crate::geo_primitives::CIRCUIT_COUNT);
        }
    }
}
