//! OD-Pair Selector (component G): filters reference points inside a diff
//! polygon, finds the best original/with-combus route to each, and narrows
//! the feasible candidates to a geographically spread top `k`.
//!
//! Grounded on `original_source/prometheus/area/area_searcher.py`'s
//! `filter_ref_points_in_diff_polygon`, `calculate_original_route`,
//! `calculate_with_combus_route_summary`/`convert_route_summry_to_route`,
//! and `_select_spread_route_pairs` (max-min haversine sampling). The
//! with-combus search here looks up a single pre-expanded
//! `CombusBridgeOutput` edge per `(enter, exit)` pair instead of walking the
//! circle section-by-section, since component D already materialises every
//! `O(k^2)` board/alight pair (spec 4.D step 3) that the Python original
//! only derives lazily inside this selector.

use itertools::Itertools;

use crate::combus_bridge::CombusBridgeOutput;
use crate::data_accessor::{DataAccessor, RefPoint};
use crate::geo_primitives::{decode_polyline, haversine_m, merge_polylines, Coord};
use crate::reachability::ReachableArea;
use crate::Error;

/// One leg of a Route (spec 3 `RouteSection`), assembled from a stored JSON
/// route blob or synthesised for the combus leg.
#[derive(Debug, Clone)]
pub struct OdRouteSection {
    pub mode: String,
    pub from_name: String,
    pub to_name: String,
    pub duration_min: i64,
    pub distance_m: f64,
    pub polyline: String,
}

/// An itinerary from one spot/stop to another (spec 3 `Route`).
#[derive(Debug, Clone)]
pub struct OdRoute {
    pub from_name: String,
    pub to_name: String,
    pub duration_min: i64,
    pub distance_m: f64,
    pub walk_distance_m: f64,
    pub polyline: String,
    pub sections: Vec<OdRouteSection>,
}

/// Bundles the pre- and post-combus route to one destination (spec 3 `RoutePair`).
#[derive(Debug, Clone)]
pub struct RoutePair {
    pub ref_point_id: String,
    pub destination_name: String,
    pub original: OdRoute,
    pub with_combus: OdRoute,
}

fn polyline_distance_m(polyline: &str) -> f64 {
    decode_polyline(polyline).windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

fn route_from_json(value: &serde_json::Value) -> Result<OdRoute, Error> {
    let sections_json = value
        .get("sections")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::InvalidData("stored route has no sections".into()))?;

    let mut sections = Vec::with_capacity(sections_json.len());
    let mut distance_m = 0.0;
    let mut walk_distance_m = 0.0;
    for s in sections_json {
        let mode = s.get("mode").and_then(|v| v.as_str()).unwrap_or("walk").to_lowercase();
        let from_name = s.get("from").and_then(|f| f.get("name")).and_then(|v| v.as_str()).unwrap_or_default();
        let to_name = s.get("to").and_then(|f| f.get("name")).and_then(|v| v.as_str()).unwrap_or_default();
        let section_duration = s.get("duration_m").and_then(|v| v.as_i64()).unwrap_or(0);
        let section_distance = s.get("distance_m").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let polyline = s.get("geometry").and_then(|v| v.as_str()).unwrap_or_default();

        distance_m += section_distance;
        if mode == "walk" {
            walk_distance_m += section_distance;
        }
        sections.push(OdRouteSection {
            mode,
            from_name: from_name.to_string(),
            to_name: to_name.to_string(),
            duration_min: section_duration,
            distance_m: section_distance,
            polyline: polyline.to_string(),
        });
    }

    let duration_min = value
        .get("duration_m")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::InvalidData("stored route has no duration_m".into()))?;
    let polyline = value.get("geometry").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let from_name = sections.first().map(|s| s.from_name.clone()).unwrap_or_default();
    let to_name = sections.last().map(|s| s.to_name.clone()).unwrap_or_default();

    Ok(OdRoute { from_name, to_name, duration_min, distance_m, walk_distance_m, polyline, sections })
}

fn merge_route(mut enter: OdRoute, combus: OdRouteSection, mut exit: OdRoute) -> OdRoute {
    let polyline = merge_polylines(&merge_polylines(&enter.polyline, &combus.polyline), &exit.polyline);
    let duration_min = enter.duration_min + combus.duration_min + exit.duration_min;
    let distance_m = enter.distance_m + combus.distance_m + exit.distance_m;
    let walk_distance_m = enter.walk_distance_m + exit.walk_distance_m;
    let from_name = enter.from_name.clone();
    let to_name = exit.to_name.clone();

    let mut sections = std::mem::take(&mut enter.sections);
    sections.push(combus);
    sections.append(&mut exit.sections);

    OdRoute { from_name, to_name, duration_min, distance_m, walk_distance_m, polyline, sections }
}

/// Keeps only the reference points whose coordinate falls inside `diff`
/// (spec 4.G step 1).
pub fn filter_ref_points_in_diff<'a>(
    ref_points: impl Iterator<Item = &'a RefPoint>,
    diff: &ReachableArea,
) -> Result<Vec<&'a RefPoint>, Error> {
    use geo::Contains;

    let polygon = crate::reachability::multipolygon_from_geojson(&diff.polygon_geojson)?;
    Ok(ref_points.filter(|rp| polygon.contains(&rp.coord.as_point())).collect())
}

/// Among `spot_ids`, the route with the smallest travel time to `ref_point`
/// without the combus (spec 4.G step 2, "original route").
pub fn best_original_route(
    accessor: &DataAccessor,
    ref_point_id: &str,
    spot_ids: &[String],
    start_time: &str,
) -> Result<OdRoute, Error> {
    let best_spot = spot_ids
        .iter()
        .filter_map(|spot_id| accessor.spot_to_spot(spot_id, ref_point_id, start_time).map(|s| (spot_id, s)))
        .min_by_key(|(_, summary)| summary.duration_min)
        .map(|(spot_id, _)| spot_id)
        .ok_or_else(|| Error::DataNotFound(format!("no original route to {ref_point_id}")))?;

    route_from_json(accessor.load_route(best_spot, ref_point_id, start_time)?.as_ref())
}

/// The cheapest feasible `(spot -> enter stop -> exit stop -> ref_point)`
/// combus itinerary, or `None` when no `(enter, exit)` pair keeps total walk
/// within `max_walk_m` (spec 4.G step 2, "with-combus route").
pub fn best_with_combus_route(
    accessor: &DataAccessor,
    ref_point_id: &str,
    spot_ids: &[String],
    start_time: &str,
    max_walk_m: f64,
    combus: &CombusBridgeOutput,
) -> Result<Option<OdRoute>, Error> {
    const EXIT_START_TIME: &str = "1000";

    let mut best: Option<(i64, OdRoute)> = None;

    for spot_id in spot_ids {
        for enter in &combus.nodes {
            let Some(enter_summary) = accessor.spot_to_spot(spot_id, &enter.id, start_time) else { continue };

            for exit in combus.nodes.iter().filter(|n| n.id != enter.id) {
                let Some(exit_summary) = accessor.spot_to_spot(&exit.id, ref_point_id, EXIT_START_TIME) else {
                    continue;
                };

                let total_walk_m = enter_summary.walk_m + exit_summary.walk_m;
                if total_walk_m > max_walk_m {
                    continue;
                }

                let Some(combus_edge) = combus.edges.iter().find(|e| e.from == enter.id && e.to == exit.id) else {
                    continue;
                };

                let total_duration_min = enter_summary.duration_min + combus_edge.duration_min + exit_summary.duration_min;
                let is_better = match &best {
                    Some((d, _)) => total_duration_min < *d,
                    None => true,
                };
                if !is_better {
                    continue;
                }

                let enter_leg = route_from_json(accessor.load_route(spot_id, &enter.id, start_time)?.as_ref())?;
                let exit_leg = route_from_json(accessor.load_route(&exit.id, ref_point_id, EXIT_START_TIME)?.as_ref())?;
                let combus_section = OdRouteSection {
                    mode: "combus".to_string(),
                    from_name: enter.name.clone(),
                    to_name: exit.name.clone(),
                    duration_min: combus_edge.duration_min,
                    distance_m: polyline_distance_m(&combus_edge.polyline),
                    polyline: combus_edge.polyline.clone(),
                };
                best = Some((total_duration_min, merge_route(enter_leg, combus_section, exit_leg)));
            }
        }
    }

    Ok(best.map(|(_, route)| route))
}

/// Farthest-point-first selection of up to `k` destinations by haversine
/// distance between destination coordinates (spec 4.G step 4).
pub fn select_spread_pairs(mut pairs: Vec<RoutePair>, destination_coords: &[Coord], k: usize) -> Vec<RoutePair> {
    if pairs.len() <= k {
        return pairs;
    }

    let avg_dist = |i: usize| -> f64 {
        let total: f64 = destination_coords
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(j, c)| haversine_m(destination_coords[i], *c))
            .sum();
        total / (destination_coords.len().saturating_sub(1)).max(1) as f64
    };

    let first = (0..destination_coords.len()).position_max_by(|&a, &b| avg_dist(a).total_cmp(&avg_dist(b))).unwrap_or(0);

    let mut selected = vec![first];
    let mut remaining: Vec<usize> = (0..destination_coords.len()).filter(|&i| i != first).collect();

    while selected.len() < k && !remaining.is_empty() {
        let next = remaining
            .iter()
            .copied()
            .position_max_by(|&a, &b| {
                let min_a = selected.iter().map(|&s| haversine_m(destination_coords[a], destination_coords[s])).fold(f64::MAX, f64::min);
                let min_b = selected.iter().map(|&s| haversine_m(destination_coords[b], destination_coords[s])).fold(f64::MAX, f64::min);
                min_a.total_cmp(&min_b)
            })
            .unwrap();
        let chosen = remaining.remove(next);
        selected.push(chosen);
    }

    let selected_set: std::collections::HashSet<usize> = selected.into_iter().collect();
    let mut kept = Vec::with_capacity(selected_set.len());
    let mut rest = Vec::new();
    for (i, pair) in pairs.drain(..).enumerate() {
        if selected_set.contains(&i) {
            kept.push(pair);
        } else {
            rest.push(pair);
        }
    }
    drop(rest);
    kept
}

const DESTINATION_DISPLAY_NAME: &str = "目的地";

fn normalize_destination_name(mut route: OdRoute) -> OdRoute {
    route.to_name = DESTINATION_DISPLAY_NAME.to_string();
    if let Some(last) = route.sections.last_mut() {
        last.to_name = DESTINATION_DISPLAY_NAME.to_string();
    }
    route
}

/// Drives spec 4.G steps 1-5: filters the reference points to those inside
/// `diff`, finds each one's best original/with-combus route, keeps only the
/// points the combus newly makes feasible, and narrows to a spread top `k`.
#[allow(clippy::too_many_arguments)]
pub fn select_route_pairs(
    accessor: &DataAccessor,
    diff: &ReachableArea,
    spot_ids: &[String],
    max_minute: i64,
    max_walk_m: f64,
    start_time: &str,
    combus: &CombusBridgeOutput,
    k: usize,
) -> Result<Vec<RoutePair>, Error> {
    let candidates = filter_ref_points_in_diff(accessor.all_ref_points(), diff)?;

    let mut pairs = Vec::new();
    for ref_point in &candidates {
        let Ok(original) = best_original_route(accessor, &ref_point.id, spot_ids, start_time) else { continue };
        let Some(with_combus) =
            best_with_combus_route(accessor, &ref_point.id, spot_ids, start_time, max_walk_m, combus)?
        else {
            continue;
        };

        let original_feasible = original.duration_min <= max_minute && original.walk_distance_m <= max_walk_m;
        let with_combus_feasible = with_combus.duration_min <= max_minute && with_combus.walk_distance_m <= max_walk_m;
        if original_feasible || !with_combus_feasible {
            continue;
        }

        pairs.push(RoutePair {
            ref_point_id: ref_point.id.clone(),
            destination_name: ref_point.name.clone(),
            original: normalize_destination_name(original),
            with_combus: normalize_destination_name(with_combus),
        });
    }

    let destination_coords: Vec<Coord> =
        pairs.iter().map(|p| candidates.iter().find(|rp| rp.id == p.ref_point_id).unwrap().coord).collect();
    Ok(select_spread_pairs(pairs, &destination_coords, k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route_json() -> serde_json::Value {
        serde_json::json!({
            "duration_m": 20,
            "geometry": "abc",
            "sections": [
                {"mode": "WALK", "from": {"name": "Spot"}, "to": {"name": "Stop"}, "duration_m": 5, "distance_m": 150.0, "geometry": "x"},
                {"mode": "BUS", "from": {"name": "Stop"}, "to": {"name": "Dest"}, "duration_m": 15, "distance_m": 3000.0, "geometry": "y"},
            ]
        })
    }

    #[test]
    fn parses_walk_distance_from_walk_sections_only() {
        let route = route_from_json(&sample_route_json()).unwrap();
        assert_eq!(route.walk_distance_m, 150.0);
        assert_eq!(route.distance_m, 3150.0);
        assert_eq!(route.duration_min, 20);
    }

    #[test]
    fn spread_selection_keeps_all_when_fewer_than_k() {
        let pairs = vec![];
        let coords = [];
        assert_eq!(select_spread_pairs(pairs, &coords, 3).len(), 0);
    }
}
