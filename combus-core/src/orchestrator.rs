//! Request orchestrator (component H): drives C->D->E for bus-line design
//! and transit search, and D->F->G for area/impact search, mapping every
//! domain `Error` to the 4xx/5xx-shaped outcome spec section 7 names.
//!
//! Grounded on the teacher's `cascade-bin/src/main.rs` (a thin runner that
//! calls straight into the core library with no transport dependency) for
//! the shape of these entry points, and on
//! `original_source/prometheus/app.py`'s route handlers for which failure
//! kind maps to which status class.

use tracing::instrument;

use crate::combus_bridge::{self, CombusBridgeOutput};
use crate::config::Config;
use crate::data_accessor::DataAccessor;
use crate::geo_primitives::Coord;
use crate::od_selector::{self, RoutePair};
use crate::reachability::{self, ReachabilityResult};
use crate::road::{self, CarRoute, RoadGraph, Stop};
use crate::transit::{self, OverlayGuard, Route, StopIndex, TransitGraph};
use crate::Error;

/// The status class a transport layer should map an [`AppError`] to (spec
/// section 7's "Error kinds", expressed without naming a type system).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedInput,
    RouteUnreachable,
    NoTransitPath,
    DataNotFound,
}

impl ErrorKind {
    /// `400` for caller mistakes, `500` for everything the core itself
    /// could not satisfy.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::MalformedInput => 400,
            ErrorKind::RouteUnreachable | ErrorKind::NoTransitPath | ErrorKind::DataNotFound => 500,
        }
    }
}

/// A domain [`Error`] wrapped with the HTTP-shaped intent a transport layer
/// needs, without this crate depending on one.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::RouteUnreachable { .. } => ErrorKind::RouteUnreachable,
            Error::NoTransitPath { .. } | Error::LastBusMissed { .. } => ErrorKind::NoTransitPath,
            Error::DataNotFound(_) => ErrorKind::DataNotFound,
            // Every other leaf-engine failure (malformed static data, I/O,
            // a bad cast) is an operator-facing fault, not a caller mistake.
            _ => ErrorKind::DataNotFound,
        };
        AppError { kind, message: err.to_string() }
    }
}

/// `POST /search/car` (spec 6): resolves `stops` onto the road graph and
/// stitches the cyclic loop with its 10-circuit timetable.
#[instrument(skip(road_graph, stops))]
pub fn handle_car_search(road_graph: &RoadGraph, stops: &[Stop], start_time: &str) -> Result<CarRoute, AppError> {
    road::plan_car_route(road_graph, stops, start_time).map_err(AppError::from)
}

const NEAREST_CANDIDATE_COUNT: usize = 10;

/// Finds the `k` nearest candidates to `coord` across both the long-lived
/// `StopIndex` and whatever combus nodes this request just injected, since
/// the index itself is built once over the base graph and never sees them
/// (spec 4.E `find_nearest`, generalized to also cover freshly minted ids).
fn nearest_candidates(
    coord: Coord,
    stop_index: &StopIndex,
    combus: Option<&CombusBridgeOutput>,
    k: usize,
) -> Vec<(String, f64)> {
    let mut candidates = stop_index.find_nearest(coord, k);
    if let Some(combus) = combus {
        candidates.extend(
            combus
                .nodes
                .iter()
                .map(|n| (n.id.clone(), crate::geo_primitives::haversine_m(coord, n.coord))),
        );
    }
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates.truncate(k);
    candidates
}

/// `POST /search/ptrans` (spec 6): a time-dependent shortest path from
/// `start` to `goal`, optionally over a transit graph enriched with the
/// combus edges from `car_route`. Owns the per-request [`OverlayGuard`] for
/// the whole search+trace, dropping it — and so reverting every injected
/// node/edge — before returning (spec invariant 4).
#[instrument(skip(transit_graph, stop_index, car_route, config))]
pub fn handle_ptrans_search(
    transit_graph: &TransitGraph,
    stop_index: &StopIndex,
    start: Coord,
    goal: Coord,
    start_time: &str,
    car_route: Option<&CarRoute>,
    config: &Config,
) -> Result<Route, AppError> {
    let mut guard = OverlayGuard::new(transit_graph);
    let combus = car_route.map(combus_bridge::bridge_car_route);

    if let Some(combus) = &combus {
        guard.overlay().add_combus(combus, config.walk_speed_m_per_min, config.walk_edge_threshold_min);
    }

    let start_candidates = nearest_candidates(start, stop_index, combus.as_ref(), NEAREST_CANDIDATE_COUNT);
    let goal_candidates = nearest_candidates(goal, stop_index, combus.as_ref(), NEAREST_CANDIDATE_COUNT);
    guard.overlay().add_anchors(start, goal, &start_candidates, &goal_candidates, config.walk_speed_m_per_min);

    let result = (|| -> Result<Route, Error> {
        let search_result = transit::find_path(guard.overlay(), start_time)?
            .ok_or_else(|| Error::NoTransitPath { from: start_time.to_string(), to: "GOAL".to_string() })?;
        transit::trace(guard.overlay(), &search_result.path_node_ids, search_result.arrival_time_min)
    })();

    guard.clear().map_err(AppError::from)?;
    result.map_err(AppError::from)
}

/// Everything `POST /area/search` (spec 6) returns for one query: the
/// original/with-combus/diff reachable areas and scores, the selected
/// route pairs, and the combus bridge output the caller supplied (so a
/// transport layer can echo it back unchanged).
pub struct AreaSearchResult {
    pub reachability: ReachabilityResult,
    pub route_pairs: Vec<RoutePair>,
    pub combus: Option<CombusBridgeOutput>,
}

const SPREAD_SELECTION_COUNT: usize = 3;

/// `POST /area/search` (spec 6, spec 2 "Area/impact" data flow): D -> F -> G.
/// `combus_stops` is `None`/empty for the "before" baseline (spec scenario D)
/// and a user-supplied ordered stop list for the "after" comparison (spec
/// scenario E).
#[instrument(skip(accessor, road_graph, spot_ids, combus_stops))]
pub fn handle_area_search(
    accessor: &DataAccessor,
    road_graph: &RoadGraph,
    spot_ids: &[String],
    max_minute: i64,
    max_walk_m: f64,
    start_time: &str,
    combus_stops: Option<&[Stop]>,
) -> Result<AreaSearchResult, AppError> {
    let combus = match combus_stops {
        Some(stops) if !stops.is_empty() => {
            let car_route = road::plan_car_route(road_graph, stops, "10:00").map_err(AppError::from)?;
            Some(combus_bridge::bridge_car_route(&car_route))
        }
        _ => None,
    };

    let reachability_result =
        reachability::evaluate(accessor, spot_ids, max_minute, max_walk_m as i64, start_time, combus.as_ref())
            .map_err(AppError::from)?;

    let route_pairs = match &combus {
        Some(combus) => od_selector::select_route_pairs(
            accessor,
            &reachability_result.diff,
            spot_ids,
            max_minute,
            max_walk_m,
            start_time,
            combus,
            SPREAD_SELECTION_COUNT,
        )
        .map_err(AppError::from)?,
        None => Vec::new(),
    };

    Ok(AreaSearchResult { reachability: reachability_result, route_pairs, combus })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_maps_to_4xx() {
        let app_err: AppError = Error::MalformedInput("bad time string".into()).into();
        assert_eq!(app_err.kind, ErrorKind::MalformedInput);
        assert_eq!(app_err.kind.status_code(), 400);
    }

    #[test]
    fn route_unreachable_maps_to_5xx() {
        let app_err: AppError = Error::RouteUnreachable { from: "1".into(), to: "2".into() }.into();
        assert_eq!(app_err.kind, ErrorKind::RouteUnreachable);
        assert_eq!(app_err.kind.status_code(), 500);
    }

    #[test]
    fn last_bus_missed_is_surfaced_as_no_transit_path() {
        let app_err: AppError = Error::LastBusMissed { from: "a".into(), to: "b".into() }.into();
        assert_eq!(app_err.kind, ErrorKind::NoTransitPath);
    }
}
