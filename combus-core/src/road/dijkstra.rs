use std::collections::BinaryHeap;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

use super::graph::RoadGraph;
use super::{duration_from_distance_m, Section};
use crate::geo_primitives::encode_polyline;
use crate::util::MinScored;
use crate::Error;

/// How many of the most-recently-visited nodes are exempt from the
/// exclusion set on a relaxed retry (spec 4.C step 2). Grounded in
/// `original_source/prometheus/car_searcher.py::find_route_through_nodes`,
/// which retries with `visited_nodes[0:-20]`.
const OVERLAP_RELAXATION: usize = 20;

/// Standard min-heap Dijkstra on `graph`, skipping any neighbour present in
/// `excluded`. Ties on cost are broken by heap insertion order, matching the
/// `heapq` behaviour of the Python original.
pub fn constrained_dijkstra(
    graph: &RoadGraph,
    start: i64,
    goal: i64,
    excluded: &HashSet<i64>,
) -> Option<Vec<i64>> {
    let mut dist: HashMap<i64, f64> = HashMap::new();
    let mut prev: HashMap<i64, i64> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(start, 0.0);
    heap.push(MinScored(0.0, start));

    while let Some(MinScored(cost, node)) = heap.pop() {
        if node == goal {
            let mut path = vec![goal];
            let mut cur = goal;
            while let Some(&p) = prev.get(&cur) {
                path.push(p);
                cur = p;
            }
            path.reverse();
            return Some(path);
        }
        if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) {
            continue;
        }
        for &(neighbour, weight) in graph.neighbours(node) {
            if excluded.contains(&neighbour) {
                continue;
            }
            let next_cost = cost + weight;
            if next_cost < *dist.get(&neighbour).unwrap_or(&f64::INFINITY) {
                dist.insert(neighbour, next_cost);
                prev.insert(neighbour, node);
                heap.push(MinScored(next_cost, neighbour));
            }
        }
    }
    None
}

fn trace_section(graph: &RoadGraph, path: &[i64]) -> Section {
    let mut distance_m = 0.0;
    let mut coords = Vec::with_capacity(path.len());
    for window in path.windows(2) {
        let (from, to) = (window[0], window[1]);
        distance_m += graph.edge_distance(from, to).unwrap_or(0.0);
    }
    for &id in path {
        if let Some(node) = graph.node(id) {
            coords.push(node.coord);
        }
    }
    Section {
        distance_m,
        duration_min: duration_from_distance_m(distance_m),
        polyline: encode_polyline(&coords),
    }
}

/// Builds a non-self-overlapping cyclic route through `nearest_nodes`
/// (already-resolved road-node ids for each stop plus the closing return to
/// the first stop) using the 20-node-overlap relaxation heuristic (spec
/// 4.C `find_route_through`).
pub fn find_route_through(
    graph: &RoadGraph,
    nearest_nodes: &[i64],
) -> Result<Vec<(Vec<i64>, Section)>, Error> {
    let mut legs = Vec::with_capacity(nearest_nodes.len().saturating_sub(1));
    let mut visited_set: HashSet<i64> = HashSet::new();
    let mut visited_list: Vec<i64> = Vec::new();

    for window in nearest_nodes.windows(2) {
        let (from, to) = (window[0], window[1]);

        let path = constrained_dijkstra(graph, from, to, &visited_set).or_else(|| {
            let relaxed: HashSet<i64> = if visited_list.len() > OVERLAP_RELAXATION {
                visited_list[..visited_list.len() - OVERLAP_RELAXATION]
                    .iter()
                    .copied()
                    .collect()
            } else {
                HashSet::new()
            };
            constrained_dijkstra(graph, from, to, &relaxed)
        });

        let path = path.ok_or_else(|| Error::RouteUnreachable {
            from: from.to_string(),
            to: to.to_string(),
        })?;

        let section = trace_section(graph, &path);
        visited_list.extend(path.iter().skip(1).copied());
        visited_set.extend(path.iter().skip(1).copied());
        legs.push((path, section));
    }

    Ok(legs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph(n: i64) -> RoadGraph {
        // A straight line 0..n with unit-length edges both directions.
        let edges: Vec<(i64, i64, f64)> =
            (0..n - 1).flat_map(|i| [(i, i + 1, 1.0), (i + 1, i, 1.0)]).collect();
        RoadGraph::from_edges(n, &edges)
    }

    #[test]
    fn finds_shortest_path_on_a_line() {
        let g = line_graph(5);
        let path = constrained_dijkstra(&g, 0, 4, &HashSet::new()).unwrap();
        assert_eq!(path, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn excluded_nodes_are_skipped() {
        let g = line_graph(5);
        let mut excluded = HashSet::new();
        excluded.insert(2);
        assert!(constrained_dijkstra(&g, 0, 4, &excluded).is_none());
    }
}
