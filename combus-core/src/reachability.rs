//! Reachability & Impact Engine (component F): isochrone union/difference,
//! mesh-population scoring.
//!
//! Polygon algebra is grounded on the teacher's `algo/isochrone.rs`
//! (`geos::Geom::unary_union`, `make_valid`, `GeometryTypes` filtering); the
//! isochrone-fallback lookup and the with-combus hop-by-hop subtraction walk
//! follow `original_source/prometheus/area/area_searcher.py`
//! (`calc_original_reachable_geojson`,
//! `calc_with_combus_reachable_geojson_for_single_spot_and_stop`).

use std::collections::HashSet;

use ahash::{HashMap, HashMapExt};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon};
use geos::{Geom, Geometry as GeosGeometry, GeometryTypes};

use crate::combus_bridge::CombusBridgeOutput;
use crate::data_accessor::DataAccessor;
use crate::Error;

/// A reachability result: a polygon plus the exact mesh-code set it covers
/// (spec 3 "Isochrone record").
#[derive(Debug, Clone)]
pub struct ReachableArea {
    pub polygon_geojson: String,
    pub reachable_mesh_set: HashSet<i64>,
}

impl ReachableArea {
    fn empty() -> Self {
        Self { polygon_geojson: geojson_from_multipolygon(&MultiPolygon::new(Vec::new())), reachable_mesh_set: HashSet::new() }
    }
}

/// Everything the impact comparison of one area search needs (spec section 2
/// "Area/impact" data flow, invariant 5).
pub struct ReachabilityResult {
    pub original: ReachableArea,
    pub with_combus: ReachableArea,
    pub diff: ReachableArea,
    pub original_score: i64,
    pub with_combus_score: i64,
    pub with_combus_score_rate: f64,
}

fn ring_from_positions(ring: &[Vec<f64>]) -> LineString<f64> {
    LineString::new(ring.iter().map(|p| GeoCoord { x: p[0], y: p[1] }).collect())
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(ring_from_positions(exterior), interiors.iter().map(|r| ring_from_positions(r)).collect()))
}

/// Parses a stored isochrone/diff polygon geojson string into a
/// `MultiPolygon`, coercing a bare `Polygon` the same way the upstream
/// `_to_multipolygon` does; any other geometry type is treated as empty.
pub(crate) fn multipolygon_from_geojson(s: &str) -> Result<MultiPolygon<f64>, Error> {
    if s.trim().is_empty() {
        return Ok(MultiPolygon::new(Vec::new()));
    }
    let parsed: geojson::GeoJson =
        s.parse().map_err(|e| Error::InvalidData(format!("malformed isochrone geometry: {e}")))?;
    let geometry = match parsed {
        geojson::GeoJson::Geometry(g) => g,
        geojson::GeoJson::Feature(f) => {
            f.geometry.ok_or_else(|| Error::InvalidData("feature has no geometry".into()))?
        }
        geojson::GeoJson::FeatureCollection(_) => {
            return Err(Error::InvalidData("expected a single geometry, got a collection".into()))
        }
    };

    Ok(match geometry.value {
        geojson::Value::Polygon(rings) => MultiPolygon::new(polygon_from_rings(&rings).into_iter().collect()),
        geojson::Value::MultiPolygon(polys) => {
            MultiPolygon::new(polys.iter().filter_map(|r| polygon_from_rings(r)).collect())
        }
        _ => MultiPolygon::new(Vec::new()),
    })
}

fn geojson_from_multipolygon(mp: &MultiPolygon<f64>) -> String {
    let polys: Vec<Vec<Vec<Vec<f64>>>> = mp
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
                .collect()
        })
        .collect();
    geojson::Geometry::new(geojson::Value::MultiPolygon(polys)).to_string()
}

fn geos_from_multipolygon(mp: MultiPolygon<f64>) -> Result<GeosGeometry, Error> {
    GeosGeometry::try_from(mp).map_err(|e| Error::InvalidData(format!("geos conversion: {e}")))
}

/// Coerces any geos geometry to a valid `MultiPolygon`, the way
/// `_to_multipolygon`/`make_valid` do for the Python original: invalid
/// geometries are repaired, a bare `Polygon` is wrapped, and anything that
/// is neither (e.g. a `GeometryCollection` surfaced by `make_valid`) is
/// treated as empty rather than attempted to be decomposed.
fn ensure_valid_multipolygon(geom: GeosGeometry) -> Result<GeosGeometry, Error> {
    let geom = geom.make_valid()?;
    match geom.geometry_type() {
        GeometryTypes::MultiPolygon => Ok(geom),
        GeometryTypes::Polygon => GeosGeometry::create_multipolygon(vec![geom]).map_err(Error::from),
        _ => GeosGeometry::create_multipolygon(Vec::new()).map_err(Error::from),
    }
}

fn multipolygon_from_geos(geom: GeosGeometry) -> Result<MultiPolygon<f64>, Error> {
    let geom = ensure_valid_multipolygon(geom)?;
    let geo_geom: geo::Geometry<f64> =
        geom.try_into().map_err(|e: geos::Error| Error::InvalidData(format!("geos conversion: {e}")))?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        _ => Ok(MultiPolygon::new(Vec::new())),
    }
}

fn union_areas(base: &ReachableArea, add: &ReachableArea) -> Result<ReachableArea, Error> {
    let base_mp = multipolygon_from_geojson(&base.polygon_geojson)?;
    let add_mp = multipolygon_from_geojson(&add.polygon_geojson)?;

    let merged_mp = if add_mp.0.is_empty() {
        base_mp
    } else if base_mp.0.is_empty() {
        add_mp
    } else {
        let merged = geos_from_multipolygon(base_mp)?.union(&geos_from_multipolygon(add_mp)?)?;
        multipolygon_from_geos(merged)?
    };

    let mut reachable_mesh_set = base.reachable_mesh_set.clone();
    reachable_mesh_set.extend(&add.reachable_mesh_set);
    Ok(ReachableArea { polygon_geojson: geojson_from_multipolygon(&merged_mp), reachable_mesh_set })
}

/// `diff = with_combus \ original` (spec 4.F, invariant 5).
pub fn diff_area(with_combus: &ReachableArea, original: &ReachableArea) -> Result<ReachableArea, Error> {
    let with_mp = multipolygon_from_geojson(&with_combus.polygon_geojson)?;
    let orig_mp = multipolygon_from_geojson(&original.polygon_geojson)?;

    let diff_mp = if with_mp.0.is_empty() {
        MultiPolygon::new(Vec::new())
    } else if orig_mp.0.is_empty() {
        with_mp
    } else {
        let diff = geos_from_multipolygon(with_mp)?.difference(&geos_from_multipolygon(orig_mp)?)?;
        multipolygon_from_geos(diff)?
    };

    let reachable_mesh_set: HashSet<i64> =
        with_combus.reachable_mesh_set.difference(&original.reachable_mesh_set).copied().collect();
    Ok(ReachableArea { polygon_geojson: geojson_from_multipolygon(&diff_mp), reachable_mesh_set })
}

/// Sum of population over a mesh-code set (spec 4.F "Scoring").
pub fn score(accessor: &DataAccessor, mesh_set: &HashSet<i64>) -> i64 {
    mesh_set.iter().filter_map(|code| accessor.mesh(*code)).map(|m| m.population).sum()
}

/// Union of the isochrones of every spot at the given budget, without the
/// combus (spec 4.F `original_reachable`).
pub fn original_reachable(
    accessor: &DataAccessor,
    spot_ids: &[String],
    max_minute: i64,
    max_walk_m: i64,
    start_time: &str,
) -> Result<ReachableArea, Error> {
    let mut merged = ReachableArea::empty();
    for spot_id in spot_ids {
        let record = accessor.load_isochrone(spot_id, max_minute, max_walk_m, start_time)?;
        let single = ReachableArea {
            polygon_geojson: record.geometry_geojson.clone(),
            reachable_mesh_set: record.reachable_mesh_set.clone(),
        };
        merged = union_areas(&merged, &single)?;
    }
    Ok(merged)
}

/// For a combus line whose stops a spot can reach within budget, walks
/// forward stop-by-stop around the circle subtracting each section's
/// duration, merging in the next stop's isochrone whenever at least 10
/// minutes of budget remain (spec 4.F `with_combus_reachable`; design note
/// "reachability from combus stops uses fixed 10:00").
pub fn with_combus_reachable(
    accessor: &DataAccessor,
    spot_ids: &[String],
    max_minute: i64,
    max_walk_m: i64,
    start_time: &str,
    combus: &CombusBridgeOutput,
) -> Result<ReachableArea, Error> {
    const FIXED_COMBUS_START_TIME: &str = "1000";
    const MIN_REMAINING_MIN: i64 = 10;

    if combus.nodes.is_empty() {
        return Ok(ReachableArea::empty());
    }

    let stop_ids: Vec<&str> = combus.nodes.iter().map(|n| n.id.as_str()).collect();
    let k = stop_ids.len();

    // Single-leg duration from stop i to stop (i+1) mod k, by matching the
    // combus bridge's own single-leg edges rather than recomputing them.
    let mut section_duration: HashMap<&str, i64> = HashMap::new();
    for edge in &combus.edges {
        if let Some(i) = stop_ids.iter().position(|&id| id == edge.from) {
            if edge.to == stop_ids[(i + 1) % k] {
                section_duration.entry(edge.from.as_str()).or_insert(edge.duration_min);
            }
        }
    }

    let mut merged = ReachableArea::empty();

    for spot_id in spot_ids {
        for (stop_index, &stop_id) in stop_ids.iter().enumerate() {
            let Some(summary) = accessor.spot_to_spot(spot_id, stop_id, start_time) else { continue };
            let remaining_walk = max_walk_m as f64 - summary.walk_m;
            if remaining_walk <= 0.0 {
                continue;
            }
            let mut remaining_time = max_minute - summary.duration_min;
            if remaining_time <= 0 {
                continue;
            }

            let mut current = stop_index;
            loop {
                let duration = *section_duration.get(stop_ids[current]).unwrap_or(&0);
                remaining_time -= duration;
                if remaining_time < MIN_REMAINING_MIN {
                    break;
                }
                current = (current + 1) % k;

                let next_id = stop_ids[current];
                match accessor.load_isochrone(next_id, remaining_time, remaining_walk as i64, FIXED_COMBUS_START_TIME)
                {
                    Ok(record) => {
                        let single = ReachableArea {
                            polygon_geojson: record.geometry_geojson.clone(),
                            reachable_mesh_set: record.reachable_mesh_set.clone(),
                        };
                        merged = union_areas(&merged, &single)?;
                    }
                    Err(Error::DataNotFound(_)) => {}
                    Err(other) => return Err(other),
                }

                if current == stop_index {
                    break;
                }
            }
        }
    }

    Ok(merged)
}

/// Drives the full original/with-combus/diff/score comparison for one area
/// search (spec 2 "Area/impact" data flow).
pub fn evaluate(
    accessor: &DataAccessor,
    spot_ids: &[String],
    max_minute: i64,
    max_walk_m: i64,
    start_time: &str,
    combus: Option<&CombusBridgeOutput>,
) -> Result<ReachabilityResult, Error> {
    let original = original_reachable(accessor, spot_ids, max_minute, max_walk_m, start_time)?;
    let with_combus = match combus {
        Some(combus) => {
            let hop = with_combus_reachable(accessor, spot_ids, max_minute, max_walk_m, start_time, combus)?;
            union_areas(&original, &hop)?
        }
        None => original.clone(),
    };
    let diff = diff_area(&with_combus, &original)?;

    let original_score = score(accessor, &original.reachable_mesh_set);
    let with_combus_score = score(accessor, &with_combus.reachable_mesh_set);
    let total_population: i64 = accessor.all_mesh().map(|m| m.population).sum();
    let with_combus_score_rate = if total_population > 0 {
        with_combus_score as f64 / total_population as f64
    } else {
        0.0
    };

    Ok(ReachabilityResult { original, with_combus, diff, original_score, with_combus_score, with_combus_score_rate })
}

#[cfg(test)]
mod tests {
    use geo::Area;

    use super::*;

    fn square_geojson(x0: f64, y0: f64, x1: f64, y1: f64) -> String {
        format!(
            r#"{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}"#
        )
    }

    #[test]
    fn multipolygon_roundtrips_through_geojson() {
        let geojson = square_geojson(0.0, 0.0, 1.0, 1.0);
        let mp = multipolygon_from_geojson(&geojson).unwrap();
        assert_eq!(mp.0.len(), 1);
        let back = geojson_from_multipolygon(&mp);
        let reparsed = multipolygon_from_geojson(&back).unwrap();
        assert_eq!(reparsed.0.len(), 1);
    }

    #[test]
    fn union_of_overlapping_squares_covers_both_mesh_sets() {
        let a = ReachableArea {
            polygon_geojson: square_geojson(0.0, 0.0, 2.0, 2.0),
            reachable_mesh_set: HashSet::from_iter([1, 2]),
        };
        let b = ReachableArea {
            polygon_geojson: square_geojson(1.0, 1.0, 3.0, 3.0),
            reachable_mesh_set: HashSet::from_iter([2, 3]),
        };
        let merged = union_areas(&a, &b).unwrap();
        assert_eq!(merged.reachable_mesh_set, HashSet::from_iter([1, 2, 3]));
    }

    #[test]
    fn diff_of_identical_areas_is_empty() {
        let a = ReachableArea {
            polygon_geojson: square_geojson(0.0, 0.0, 2.0, 2.0),
            reachable_mesh_set: HashSet::from_iter([1, 2]),
        };
        let diff = diff_area(&a, &a).unwrap();
        assert!(diff.reachable_mesh_set.is_empty());
        let diff_mp = multipolygon_from_geojson(&diff.polygon_geojson).unwrap();
        assert!(diff_mp.0.iter().all(|p| p.unsigned_area() < 1e-6));
    }
}
