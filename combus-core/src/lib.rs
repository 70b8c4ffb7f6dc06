/*!
# Combus core

**combus_core** plans community-bus (*combus*) routes and evaluates their
impact on regional transit reachability. Given a circular sequence of
user-supplied stops, it resolves each stop onto a road-network graph,
stitches a non-self-overlapping loop through them, synthesises a daily
timetable, and — once that loop is treated as a new set of transit edges —
answers time-dependent shortest-path queries across a fused walk/bus/combus
network and measures how much new area the line makes reachable.

This crate has no transport dependency: everything here is plain Rust
functions and `Result`s. An HTTP layer (out of scope; see [`orchestrator`])
would map one route per `orchestrator::handle_*` call.

# Example

```ignore
use combus_core::prelude::*;

let config = Config::from_env()?;
let accessor = DataAccessor::load(&config)?;
let road_graph = RoadGraph::load(&config.road_nodes_path, &config.road_edges_path)?;
let transit_graph = TransitGraph::load(&config, &accessor)?;

let car_route = road::find_route_through(&road_graph, &stops)?;
let itinerary = orchestrator::handle_ptrans_search(
    &transit_graph, &accessor, start, goal, "10:00", Some(&car_route),
)?;
```
*/

use std::num::{ParseIntError, TryFromIntError};

use thiserror::Error;

pub mod combus_bridge;
pub mod config;
pub mod data_accessor;
pub mod geo_primitives;
pub mod od_selector;
pub mod orchestrator;
pub mod reachability;
pub mod road;
pub mod transit;
mod util;

pub mod prelude {
    pub use crate::combus_bridge::{bridge_car_route, CombusBridgeOutput};
    pub use crate::config::Config;
    pub use crate::data_accessor::DataAccessor;
    pub use crate::geo_primitives::{haversine_m, latlon_to_mesh, Coord};
    pub use crate::orchestrator;
    pub use crate::road::{self, RoadGraph};
    pub use crate::transit::{self, TransitGraph};
    pub use crate::Error;
}

/// Error type shared across every engine in this crate.
///
/// Leaf engines raise these directly; [`orchestrator::AppError`] wraps them
/// with the 4xx/5xx-shaped intent a transport layer would map to a status
/// code (section 7 of the design spec).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to cast column: {0}")]
    CastError(String),
    #[error("Numeric cast error: {0}")]
    CastErrorNumeric(#[from] TryFromIntError),
    #[error("Numeric parse error: {0}")]
    ParseError(#[from] ParseIntError),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Missing key: {0}")]
    MissingKey(String),
    #[error("Missing value in column: {0}")]
    MissingValue(String),
    #[error("Negative weight detected: {0}")]
    NegativeWeight(String),
    #[error("Node not found for id: {0}")]
    NodeNotFound(String),
    #[error("Polars error: {0}")]
    PolarsError(#[from] polars::prelude::PolarsError),
    #[error("Geometry error: {0}")]
    GeosError(#[from] geos::Error),
    #[error("Thread panicked: {0}")]
    ThreadPanicError(String),

    /// MALFORMED_INPUT — missing field, out-of-range numeric, wrong element
    /// type, unknown spot/stop id, invalid time string.
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    /// ROUTE_UNREACHABLE — no permitted path between two consecutive stops
    /// even with the 20-node overlap relaxation.
    #[error("Route unreachable between {from} and {to}")]
    RouteUnreachable { from: String, to: String },
    /// NO_TRANSIT_PATH — the transit search terminated without popping GOAL.
    #[error("No transit path found from {from} to {to}")]
    NoTransitPath { from: String, to: String },
    /// LAST_BUS_MISSED — the traced edge's timetable has no future
    /// departure at the arrival time the search committed to.
    #[error("Missed the last bus on edge {from} -> {to}")]
    LastBusMissed { from: String, to: String },
    /// DATA_NOT_FOUND — requested isochrone/route artefact missing for all
    /// `(<=minute, <=walk)` fallbacks, or an unknown cached route id.
    #[error("Data not found for key: {0}")]
    DataNotFound(String),
}

impl From<Error> for polars::prelude::PolarsError {
    fn from(err: Error) -> Self {
        match err {
            Error::PolarsError(e) => e,
            other => Self::ComputeError(other.to_string().into()),
        }
    }
}
