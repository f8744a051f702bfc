//! Query behavior: the unit-square scenarios, nearest-neighbor ordering and
//! termination semantics, and window-search soundness/completeness. Every
//! scenario runs against all three packing methods; the on-disk layouts
//! differ but the observable behavior must not.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roadtree::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const METHODS: [PackingMethod; 3] = [
    PackingMethod::Hilbert,
    PackingMethod::Str,
    PackingMethod::Omt,
];

fn method_name(method: PackingMethod) -> &'static str {
    match method {
        PackingMethod::Hilbert => "hilbert",
        PackingMethod::Str => "str",
        PackingMethod::Omt => "omt",
    }
}

fn build_files(
    edges: &[Edge],
    coords: &[Coord],
    dir: &Path,
    tag: &str,
    method: PackingMethod,
) -> (PathBuf, PathBuf) {
    let node_path = dir.join(format!("{tag}.ramIndex"));
    let leaf_path = dir.join(format!("{tag}.fileIndex"));
    build(edges, coords, &node_path, &leaf_path, method).expect("build failed");
    (node_path, leaf_path)
}

/// The four sides of the unit square, in degrees:
/// bottom (0,0)-(1,0), top (0,1)-(1,1), left (0,0)-(0,1), right (1,0)-(1,1).
fn unit_square() -> (Vec<Coord>, Vec<Edge>) {
    let coords = vec![
        Coord::from_degrees(0.0, 0.0),
        Coord::from_degrees(1.0, 0.0),
        Coord::from_degrees(0.0, 1.0),
        Coord::from_degrees(1.0, 1.0),
    ];
    let edges = vec![
        Edge::new(0, 1, SegmentId::new(10, true), SegmentId::new(11, true)),
        Edge::new(2, 3, SegmentId::new(20, true), SegmentId::new(21, true)),
        Edge::new(0, 2, SegmentId::new(30, true), SegmentId::new(31, true)),
        Edge::new(1, 3, SegmentId::new(40, true), SegmentId::new(41, true)),
    ];
    (coords, edges)
}

fn deg_rect(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Rect {
    Rect::new(
        (min_lon * COORDINATE_PRECISION) as i32,
        (max_lon * COORDINATE_PRECISION) as i32,
        (min_lat * COORDINATE_PRECISION) as i32,
        (max_lat * COORDINATE_PRECISION) as i32,
    )
}

/// Squared projected distance from `input` to the nearest point of `edge`,
/// recomputed the same way the index computes its heap keys.
fn distance_to_edge(input: Coord, edge: &Edge, coords: &[Coord]) -> u64 {
    let projected_input = from_wgs84(input);
    let projected_u = from_wgs84(coords[edge.u as usize]);
    let projected_v = from_wgs84(coords[edge.v as usize]);
    let (_, nearest) = project_point_on_segment(projected_u, projected_v, projected_input);
    squared_distance(Coord::from(projected_input), Coord::from(nearest))
}

#[test]
fn unit_square_builds_one_root_with_one_leaf() {
    // Four edges fit a single 4096-byte page, so the whole square becomes
    // one leaf under the root. The root mbr covers the projected square.
    let (coords, edges) = unit_square();
    let dir = TempDir::new().unwrap();
    let (node_path, leaf_path) =
        build_files(&edges, &coords, dir.path(), "square", PackingMethod::Hilbert);
    let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.leaves()[0].object_count, 4);

    let top_right = from_wgs84_fixed(Coord::from_degrees(1.0, 1.0));
    assert_eq!(
        tree.extent(),
        Rect::new(0, top_right.lon, 0, top_right.lat)
    );
}

#[test]
fn nearest_single_result_near_origin() {
    // Q = (0.1, 0.1). The bottom and left edges are both 0.1 degrees away in
    // projection (the Mercator stretch at this latitude rounds away in
    // fixed-point), so either may be popped first; the other two edges are
    // strictly farther.
    let (coords, edges) = unit_square();
    let dir = TempDir::new().unwrap();
    let q = Coord::from_degrees(0.1, 0.1);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        let results = tree.nearest(q, 1);
        assert_eq!(results.len(), 1, "{tag}");
        let hit = results[0];
        assert!(
            (hit.u, hit.v) == (0, 1) || (hit.u, hit.v) == (0, 2),
            "{tag}: expected the bottom or left edge, got ({}, {})",
            hit.u,
            hit.v
        );
        // 0.1 degrees == 100_000 fixed units; squared distance 1e10
        assert_eq!(distance_to_edge(q, &hit, &coords), 10_000_000_000, "{tag}");
    }
}

#[test]
fn window_search_returns_intersecting_edges() {
    let (coords, edges) = unit_square();
    let dir = TempDir::new().unwrap();
    let window = deg_rect(-0.1, 0.6, -0.1, 0.6);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        let mut hits: Vec<(u32, u32)> = tree
            .search_in_box(window)
            .iter()
            .map(|e| (e.u, e.v))
            .collect();
        hits.sort_unstable();
        // bottom and left touch the window; top and right do not
        assert_eq!(hits, vec![(0, 1), (0, 2)], "{tag}");
    }
}

#[test]
fn filter_drops_edges_and_masks_flags() {
    // All forward flags enabled except the right edge; the filter rejects
    // candidates whose forward flag is off. From the square's center the
    // remaining three edges come back ordered left, bottom, top (Mercator
    // pushes the top edge farthest from the center).
    let (coords, mut edges) = unit_square();
    edges[3].forward_segment_id = SegmentId::new(40, false);
    let dir = TempDir::new().unwrap();
    let q = Coord::from_degrees(0.5, 0.5);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        let results = tree.nearest_with(
            q,
            |candidate| {
                if candidate.data.forward_segment_id.enabled() {
                    (true, true)
                } else {
                    (false, false)
                }
            },
            |_, _| false,
        );
        let hits: Vec<(u32, u32)> = results.iter().map(|e| (e.u, e.v)).collect();
        assert_eq!(hits, vec![(0, 2), (0, 1), (2, 3)], "{tag}");
    }
}

#[test]
fn zero_max_results_returns_nothing() {
    let (coords, edges) = unit_square();
    let dir = TempDir::new().unwrap();
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();
        assert!(
            tree.nearest(Coord::from_degrees(0.5, 0.5), 0).is_empty(),
            "{tag}"
        );
    }
}

/// Deterministic pseudo-random road network around (45 N, 0 E).
fn random_network(num_coords: usize, num_edges: usize, seed: u64) -> (Vec<Coord>, Vec<Edge>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let coords: Vec<Coord> = (0..num_coords)
        .map(|_| {
            Coord::from_degrees(
                rng.gen_range(-0.5..0.5),
                rng.gen_range(44.5..45.5),
            )
        })
        .collect();
    let edges: Vec<Edge> = (0..num_edges)
        .map(|i| {
            let u = rng.gen_range(0..num_coords as u32);
            let v = rng.gen_range(0..num_coords as u32);
            Edge::new(
                u,
                v,
                SegmentId::new(2 * i as u32, true),
                SegmentId::new(2 * i as u32 + 1, true),
            )
        })
        .collect();
    (coords, edges)
}

#[test]
fn nearest_is_ordered_and_complete() {
    let (coords, edges) = random_network(300, 1200, 29);
    let dir = TempDir::new().unwrap();
    let q = Coord::from_degrees(0.05, 45.02);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        // accept-everything filter, never-fire terminator: drains the tree
        let results = tree.nearest_with(q, |_| (true, true), |_, _| false);
        assert_eq!(results.len(), edges.len(), "{tag}: some edges never surfaced");

        let distances: Vec<u64> = results
            .iter()
            .map(|edge| distance_to_edge(q, edge, &coords))
            .collect();
        for pair in distances.windows(2) {
            assert!(pair[0] <= pair[1], "{tag}: results out of order");
        }
    }
}

#[test]
fn terminator_stops_before_admitting_the_candidate() {
    let (coords, edges) = random_network(300, 1200, 31);
    let dir = TempDir::new().unwrap();
    let q = Coord::from_degrees(-0.2, 44.8);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        let full = tree.nearest_with(q, |_| (true, true), |_, _| false);
        let limited = tree.nearest(q, 5);
        assert_eq!(limited.len(), 5, "{tag}");

        // the limited run must see the same distance prefix as the full run
        // (ties may swap which edge fills a slot, distances cannot change)
        for (a, b) in limited.iter().zip(full.iter()) {
            assert_eq!(
                distance_to_edge(q, a, &coords),
                distance_to_edge(q, b, &coords),
                "{tag}: limited run diverged from the full ordering"
            );
        }
    }
}

#[test]
fn terminator_sees_monotone_candidates() {
    let (coords, edges) = random_network(200, 800, 37);
    let dir = TempDir::new().unwrap();
    let q = Coord::from_degrees(0.3, 45.3);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        let q_projected = Coord::from(from_wgs84(q));
        let mut last_dist = 0u64;
        tree.nearest_with(
            q,
            |_| (true, true),
            |_, candidate| {
                let dist = squared_distance(q_projected, candidate.fixed_projected_coordinate);
                assert!(dist >= last_dist, "{tag}: terminator saw unordered candidates");
                last_dist = dist;
                false
            },
        );
    }
}

#[test]
fn filter_masks_are_anded_into_flags() {
    let (coords, edges) = random_network(100, 400, 41);
    let dir = TempDir::new().unwrap();
    let q = Coord::from_degrees(0.0, 45.0);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        let results = tree.nearest_with(q, |_| (true, false), |num, _| num >= 50);
        assert_eq!(results.len(), 50, "{tag}");
        for edge in &results {
            assert!(edge.forward_segment_id.enabled(), "{tag}: forward flag lost");
            assert!(!edge.reverse_segment_id.enabled(), "{tag}: reverse flag kept");
        }

        // rejecting everything yields an empty result, not an endless loop
        let rejected = tree.nearest_with(q, |_| (false, false), |_, _| false);
        assert!(rejected.is_empty(), "{tag}");
    }
}

#[test]
fn round_trip_finds_an_edge_at_least_as_close() {
    let (coords, edges) = random_network(300, 900, 43);
    let dir = TempDir::new().unwrap();
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        for edge in edges.iter().step_by(31) {
            let midpoint = centroid(coords[edge.u as usize], coords[edge.v as usize]);
            let results = tree.nearest(midpoint, 1);
            assert_eq!(results.len(), 1, "{tag}");
            assert!(
                distance_to_edge(midpoint, &results[0], &coords)
                    <= distance_to_edge(midpoint, edge, &coords),
                "{tag}: nearest returned a farther edge than one in the tree"
            );
        }
    }
}

#[test]
fn window_search_matches_brute_force() {
    let (coords, edges) = random_network(300, 1200, 47);
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(53);
    for method in METHODS {
        let tag = method_name(method);
        let (node_path, leaf_path) = build_files(&edges, &coords, dir.path(), tag, method);
        let tree = RoadTree::open(&node_path, &leaf_path, &coords).unwrap();

        for _ in 0..20 {
            let lon_a: f64 = rng.gen_range(-0.6..0.6);
            let lon_b: f64 = rng.gen_range(-0.6..0.6);
            let lat_a: f64 = rng.gen_range(44.4..45.6);
            let lat_b: f64 = rng.gen_range(44.4..45.6);
            let window = deg_rect(
                lon_a.min(lon_b),
                lon_a.max(lon_b),
                lat_a.min(lat_b),
                lat_a.max(lat_b),
            );

            let mut hits: Vec<u32> = tree
                .search_in_box(window)
                .iter()
                .map(|e| e.forward_segment_id.id())
                .collect();
            hits.sort_unstable();

            let mut expected: Vec<u32> = edges
                .iter()
                .filter(|edge| {
                    let u = coords[edge.u as usize];
                    let v = coords[edge.v as usize];
                    let bbox = Rect::new(
                        u.lon.min(v.lon),
                        u.lon.max(v.lon),
                        u.lat.min(v.lat),
                        u.lat.max(v.lat),
                    );
                    bbox.intersects(&window)
                })
                .map(|edge| edge.forward_segment_id.id())
                .collect();
            expected.sort_unstable();

            assert_eq!(hits, expected, "{tag}: window results differ from brute force");
        }
    }
}
