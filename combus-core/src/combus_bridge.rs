//! Combus Bridge (component D): converts a finished `CarRoute` into transit
//! graph nodes and edges.
//!
//! Grounded on `original_source/prometheus/ptrans/network.py::convert_carroute_2_combus_data`
//! for id minting and single-leg edge construction, and on spec 4.D / the
//! design notes for the multi-leg contiguous sub-run expansion.

use serde::{Deserialize, Serialize};

use crate::geo_primitives::{merge_polylines, Coord};
use crate::road::CarRoute;

/// A node minted for one combus stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombusNode {
    pub id: String,
    pub name: String,
    pub coord: Coord,
}

/// A directed combus hop: either a single road-network leg, or a merged
/// multi-leg "stay on the bus" shortcut (spec 4.D step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombusEdge {
    pub from: String,
    pub to: String,
    pub duration_min: i64,
    pub display_name: String,
    pub polyline: String,
    pub time_table_weekday: Vec<String>,
    pub time_table_holiday: Vec<String>,
}

pub struct CombusBridgeOutput {
    pub nodes: Vec<CombusNode>,
    pub edges: Vec<CombusEdge>,
}

const DISPLAY_NAME: &str = "コミュニティバス";

/// A tiny linear-congruential PRNG seeded from the route's own content, so a
/// given `CarRoute` always mints the same ids within one run (spec 4.D step
/// 1: "seed-fixed PRNG"). Using a route-derived seed rather than a global
/// counter keeps minting pure and reproducible for tests.
struct SeededIdMinter {
    state: u64,
}

impl SeededIdMinter {
    fn new(seed: u64) -> Self {
        Self { state: seed ^ 0x9E3779B97F4A7C15 }
    }

    fn next_id(&mut self) -> String {
        // xorshift64*
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        let value = 1000 + (self.state % 9000);
        format!("A{value}")
    }
}

fn route_seed(route: &CarRoute) -> u64 {
    let mut seed = route.stops.len() as u64;
    for entry in &route.stops {
        seed = seed
            .wrapping_mul(31)
            .wrapping_add(entry.stop.coord.lat.to_bits())
            .wrapping_add(entry.stop.coord.lon.to_bits());
    }
    seed
}

/// Builds the combus nodes/edges for a finished circular `CarRoute` (spec
/// 4.D).
pub fn bridge_car_route(route: &CarRoute) -> CombusBridgeOutput {
    let k = route.stops.len();
    let mut minter = SeededIdMinter::new(route_seed(route));
    let node_ids: Vec<String> = (0..k).map(|_| minter.next_id()).collect();

    let nodes = route
        .stops
        .iter()
        .enumerate()
        .map(|(i, entry)| CombusNode {
            id: node_ids[i].clone(),
            name: format!("バス停{}", i + 1),
            coord: entry.stop.coord,
        })
        .collect();

    let mut edges = Vec::new();

    // Single-leg edges: one per section, matching `convert_carroute_2_combus_data`.
    for (i, section) in route.sections.iter().enumerate() {
        let to = node_ids[(i + 1) % k].clone();
        edges.push(CombusEdge {
            from: node_ids[i].clone(),
            to,
            duration_min: section.duration_min,
            display_name: DISPLAY_NAME.to_string(),
            polyline: section.polyline.clone(),
            time_table_weekday: route.stops[i].departure_times.clone(),
            time_table_holiday: route.stops[i].departure_times.clone(),
        });
    }

    // Multi-leg edges: every contiguous sub-run of length 2..=k-1, so a
    // search hop may board at s_i and alight at any other stop directly
    // (spec 4.D step 3 / design note on O(k^2) pre-expansion). Lengths below
    // 2 are already covered by the single-leg loop above.
    for start in 0..k {
        let mut polyline = route.sections[start].polyline.clone();
        let mut leg_duration = route.sections[start].duration_min;
        for run_len in 2..k {
            let next_section = &route.sections[(start + run_len - 1) % k];
            polyline = merge_polylines(&polyline, &next_section.polyline);
            leg_duration += next_section.duration_min;

            let end = (start + run_len) % k;
            edges.push(CombusEdge {
                from: node_ids[start].clone(),
                to: node_ids[end].clone(),
                duration_min: leg_duration,
                display_name: DISPLAY_NAME.to_string(),
                polyline: polyline.clone(),
                time_table_weekday: route.stops[start].departure_times.clone(),
                time_table_holiday: route.stops[start].departure_times.clone(),
            });
        }
    }

    CombusBridgeOutput { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::{Section, Stop, StopEntry};

    fn sample_route() -> CarRoute {
        let stop = |name: &str, lat: f64| Stop { name: name.into(), coord: Coord::new(lat, 137.0) };
        let entry = |name: &str, lat: f64| StopEntry {
            stop: stop(name, lat),
            stay_time_min: 1,
            departure_times: vec!["10:00".into(), "11:00".into()],
        };
        let section = || Section { distance_m: 100.0, duration_min: 5, polyline: "a".into() };
        CarRoute {
            total_distance_m: 400.0,
            total_duration_min: 24,
            stops: vec![entry("a", 36.0), entry("b", 36.1), entry("c", 36.2), entry("d", 36.3)],
            sections: vec![section(), section(), section(), section()],
        }
    }

    #[test]
    fn mints_one_node_per_stop_with_stable_ids() {
        let route = sample_route();
        let first = bridge_car_route(&route);
        let second = bridge_car_route(&route);
        assert_eq!(first.nodes.len(), 4);
        assert_eq!(
            first.nodes.iter().map(|n| &n.id).collect::<Vec<_>>(),
            second.nodes.iter().map(|n| &n.id).collect::<Vec<_>>(),
        );
        for node in &first.nodes {
            assert!(node.id.starts_with('A'));
            assert_eq!(node.id.len(), 5);
        }
    }

    #[test]
    fn multi_leg_edges_cover_every_pair() {
        let route = sample_route();
        let output = bridge_car_route(&route);
        let node_ids: Vec<&str> = output.nodes.iter().map(|n| n.id.as_str()).collect();
        let k = node_ids.len();

        // k single-leg + k*(k-2) multi-leg edges for k=4.
        assert_eq!(output.edges.len(), k + k * (k - 2));

        for (i, &from) in node_ids.iter().enumerate() {
            for (j, &to) in node_ids.iter().enumerate() {
                if i == j {
                    continue;
                }
                let matches = output.edges.iter().filter(|e| e.from == from && e.to == to).count();
                assert_eq!(matches, 1, "expected exactly one edge {from} -> {to}");
            }
        }
    }
}
