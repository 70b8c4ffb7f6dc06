//! End-to-end coverage over the public `combus_core` API: plans a circular
//! combus route on a small synthetic road network, then runs transit
//! searches with and without it injected, checking the invariants spec
//! section 8 names rather than literal production-data outputs (the real
//! GTFS/mesh/isochrone tables this crate consumes are out of scope here).

use std::fs;
use std::path::PathBuf;

use combus_core::geo_primitives::hhmm_to_minutes;
use combus_core::orchestrator;
use combus_core::prelude::*;
use combus_core::road::Stop;
use combus_core::transit::{EdgeKind, GraphEdge, TimeTable, TransitNode};

fn write_csv(path: &PathBuf, header: &str, rows: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut contents = String::from(header);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    fs::write(path, contents).unwrap();
}

/// A four-node square road network, one node per corner, unit edge weights
/// both directions, so `find_route_through` never needs the overlap-relax
/// retry.
fn road_graph_fixture(dir: &std::path::Path) -> RoadGraph {
    let nodes_path = dir.join("road/nodes.csv");
    let edges_path = dir.join("road/edges.csv");

    write_csv(
        &nodes_path,
        "id,lat,lon",
        &[
            "1,36.000,137.000".to_string(),
            "2,36.001,137.000".to_string(),
            "3,36.001,137.001".to_string(),
            "4,36.000,137.001".to_string(),
        ],
    );
    write_csv(
        &edges_path,
        "from,to,distance",
        &[
            "1,2,100.0".to_string(),
            "2,1,100.0".to_string(),
            "2,3,100.0".to_string(),
            "3,2,100.0".to_string(),
            "3,4,100.0".to_string(),
            "4,3,100.0".to_string(),
            "4,1,100.0".to_string(),
            "1,4,100.0".to_string(),
        ],
    );

    RoadGraph::load(&nodes_path, &edges_path).expect("fixture road graph should load")
}

fn sample_stops() -> Vec<Stop> {
    vec![
        Stop { name: "corner-1".into(), coord: Coord::new(36.000, 137.000) },
        Stop { name: "corner-2".into(), coord: Coord::new(36.001, 137.000) },
        Stop { name: "corner-3".into(), coord: Coord::new(36.001, 137.001) },
        Stop { name: "corner-4".into(), coord: Coord::new(36.000, 137.001) },
    ]
}

/// Invariants 1 and 2 (spec section 8): `|sections| = |stops|` and the
/// aggregate totals are the sum of per-section values plus one stay minute
/// per stop.
#[test]
fn car_search_produces_one_section_per_stop_with_summed_totals() {
    let dir = std::env::temp_dir().join(format!("combus-test-car-{}", std::process::id()));
    let road_graph = road_graph_fixture(&dir);
    let stops = sample_stops();

    let route = orchestrator::handle_car_search(&road_graph, &stops, "10:00").expect("route should be found");

    assert_eq!(route.sections.len(), stops.len());
    assert_eq!(route.stops.len(), stops.len());

    let summed_distance: f64 = route.sections.iter().map(|s| s.distance_m).sum();
    let summed_duration: i64 = route.sections.iter().map(|s| s.duration_min).sum();
    assert_eq!(route.total_distance_m, summed_distance);
    assert_eq!(route.total_duration_min, summed_duration + stops.len() as i64);

    for entry in &route.stops {
        assert_eq!(entry.departure_times.len(), 10);
    }

    let _ = fs::remove_dir_all(&dir);
}

fn dummy_config() -> Config {
    Config {
        road_nodes_path: PathBuf::new(),
        road_edges_path: PathBuf::new(),
        gtfs_dir: PathBuf::new(),
        gtfs_shapes_path: PathBuf::new(),
        spot_list_path: PathBuf::new(),
        combus_stops_path: PathBuf::new(),
        combus_routes_path: PathBuf::new(),
        ref_points_path: PathBuf::new(),
        spot_to_spot_summary_path: PathBuf::new(),
        mesh_path: PathBuf::new(),
        best_combus_stop_sequences_path: PathBuf::new(),
        isochrone_dir: PathBuf::new(),
        route_cache_dir: PathBuf::new(),
        walk_speed_m_per_min: 30.0,
        circuit_count: 10,
        walk_edge_threshold_min: 10.0,
    }
}

/// A two-stop transit graph, `a --bus(10min)--> b`, with one scheduled
/// weekday departure at 10:30. `a` sits exactly at the search's start
/// coordinate and `b` exactly at its goal, so the anchors attach with a
/// zero-distance walk on each end.
fn transit_graph_fixture() -> TransitGraph {
    let mut graph = TransitGraph::new();
    graph.add_node(TransitNode { node_id: "a".into(), name: "Stop A".into(), coord: Coord::new(36.0, 137.0) });
    graph.add_node(TransitNode { node_id: "b".into(), name: "Stop B".into(), coord: Coord::new(36.01, 137.01) });
    graph
        .add_edge(
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
    graph
}

/// A scenario-C-style itinerary: board a scheduled bus that has not yet
/// departed, so the search waits for it rather than treating the edge's
/// raw travel time as the cost.
#[test]
fn ptrans_search_waits_for_scheduled_departure() {
    let graph = transit_graph_fixture();
    let stop_index = transit::StopIndex::build(&graph);
    let config = dummy_config();

    let route = orchestrator::handle_ptrans_search(
        &graph,
        &stop_index,
        Coord::new(36.0, 137.0),
        Coord::new(36.01, 137.01),
        "10:00",
        None,
        &config,
    )
    .expect("itinerary should be found");

    let bus_section = route.sections.iter().find(|s| s.mode == EdgeKind::Bus).expect("a bus leg should be traced");
    assert_eq!(bus_section.start_time_min, hhmm_to_minutes("10:30").unwrap() as i64);
    assert_eq!(route.start_time_min, hhmm_to_minutes("10:00").unwrap() as i64);
    assert_eq!(route.goal_time_min, hhmm_to_minutes("10:41").unwrap() as i64);
}

/// Spec invariant 4: after a `/search/ptrans` request returns, the shared
/// transit graph carries none of the request's injected state. Running the
/// same search twice must yield identical results, proving the `START`/
/// `GOAL` anchors from the first call never leaked into the second.
#[test]
fn ptrans_search_leaves_no_state_behind_between_requests() {
    let graph = transit_graph_fixture();
    let stop_index = transit::StopIndex::build(&graph);
    let config = dummy_config();

    let first = orchestrator::handle_ptrans_search(
        &graph,
        &stop_index,
        Coord::new(36.0, 137.0),
        Coord::new(36.01, 137.01),
        "10:00",
        None,
        &config,
    )
    .unwrap();
    let second = orchestrator::handle_ptrans_search(
        &graph,
        &stop_index,
        Coord::new(36.0, 137.0),
        Coord::new(36.01, 137.01),
        "10:00",
        None,
        &config,
    )
    .unwrap();

    assert_eq!(first.total_duration_min, second.total_duration_min);
    assert_eq!(first.sections.len(), second.sections.len());
    assert!(!graph.contains("START"));
    assert!(!graph.contains("GOAL"));
}

/// With no stops in the base graph at all, `START` gets no anchor edges and
/// the search exhausts its heap without ever reaching `GOAL`; the
/// orchestrator maps that `None` result to a `NoTransitPath` 5xx (spec
/// section 7).
#[test]
fn unreachable_goal_surfaces_as_no_transit_path() {
    let graph = TransitGraph::new();
    let stop_index = transit::StopIndex::build(&graph);
    let config = dummy_config();

    let result = orchestrator::handle_ptrans_search(
        &graph,
        &stop_index,
        Coord::new(0.0, 0.0),
        Coord::new(10.0, 10.0),
        "10:00",
        None,
        &config,
    );

    let err = result.expect_err("a search over an empty graph should fail");
    assert_eq!(err.kind, orchestrator::ErrorKind::NoTransitPath);
    assert_eq!(err.kind.status_code(), 500);
}

/// A malformed time string is a caller mistake, mapped to 4xx.
#[test]
fn malformed_start_time_is_a_caller_error() {
    let dir = std::env::temp_dir().join(format!("combus-test-malformed-{}", std::process::id()));
    let road_graph = road_graph_fixture(&dir);
    let stops = sample_stops();

    let result = orchestrator::handle_car_search(&road_graph, &stops, "not-a-time");
    let err = result.expect_err("a malformed time string should error");
    assert_eq!(err.kind, orchestrator::ErrorKind::MalformedInput);
    assert_eq!(err.kind.status_code(), 400);

    let _ = fs::remove_dir_all(&dir);
}
