//! Thin demo runner over `combus_core`: loads the configured data directory,
//! plans one circular combus line, then runs a transit search with and
//! without it injected. No transport dependency — a real deployment wires
//! `orchestrator::handle_*` behind an HTTP framework instead.

use combus_core::prelude::*;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let accessor = DataAccessor::load(&config)?;
    let road_graph = RoadGraph::load(&config.road_nodes_path, &config.road_edges_path)?;
    let transit_graph = TransitGraph::load(&config, &accessor)?;
    let stop_index = transit::StopIndex::build(&transit_graph);

    let stops = vec![
        road::Stop { name: "stop-1".into(), coord: Coord::new(36.61095, 137.2509) },
        road::Stop { name: "stop-2".into(), coord: Coord::new(36.61065, 137.2145) },
        road::Stop { name: "stop-3".into(), coord: Coord::new(36.61303, 137.1858) },
        road::Stop { name: "stop-4".into(), coord: Coord::new(36.63100, 137.2149) },
    ];

    let start = std::time::Instant::now();
    let car_route = orchestrator::handle_car_search(&road_graph, &stops, "10:00")?;
    info!(elapsed = ?start.elapsed(), sections = car_route.sections.len(), "planned combus loop");

    let origin = Coord::new(36.69656, 137.1366);
    let destination = Coord::new(36.68804, 137.2109);

    let start = std::time::Instant::now();
    let baseline =
        orchestrator::handle_ptrans_search(&transit_graph, &stop_index, origin, destination, "10:00", None, &config)?;
    info!(elapsed = ?start.elapsed(), sections = baseline.sections.len(), "baseline itinerary (no combus)");

    let start = std::time::Instant::now();
    let with_combus = orchestrator::handle_ptrans_search(
        &transit_graph,
        &stop_index,
        origin,
        destination,
        "10:00",
        Some(&car_route),
        &config,
    )?;
    info!(
        elapsed = ?start.elapsed(),
        sections = with_combus.sections.len(),
        duration_min = with_combus.total_duration_min,
        "itinerary with the new combus line",
    );

    Ok(())
}
