use grt_common::db::core::{GridSpec, RoutingDB};
use grt_common::error::{Result, RouteError};
use grt_common::geom::coord::GridCoord;
use grt_common::util::check::verify_routes;
use grt_common::util::config::RouterConfig;
use grt_common::util::generator::{BenchmarkParams, generate_random_benchmark};
use grt_router::steiner::{Branch, TopologyGenerator, TopologyRequest};
use grt_router::{NetState, Router, route};

fn db_with(grid: GridSpec, nets: &[&[(u32, u32, u8)]]) -> RoutingDB {
    let mut db = RoutingDB::new(grid);
    for (i, pins) in nets.iter().enumerate() {
        db.add_net(
            format!("net{}", i),
            pins.iter().map(|&(x, y, z)| GridCoord::new(x, y, z)).collect(),
        );
    }
    db
}

/// Three nets crossing from column 0 to column 3 of a 4x4 grid whose only open
/// horizontal edge between columns 1 and 2 is on row 0, with one track.
fn bottleneck() -> RoutingDB {
    let mut db = db_with(
        GridSpec::uniform(4, 4, 1, 1),
        &[
            &[(0, 0, 0), (3, 0, 0)],
            &[(0, 1, 0), (3, 1, 0)],
            &[(0, 2, 0), (3, 2, 0)],
        ],
    );
    for y in 1..4 {
        db.add_adjustment(GridCoord::new(1, y, 0), GridCoord::new(2, y, 0), 0);
    }
    db
}

#[test]
fn diagonal_net_on_small_grid() {
    let db = db_with(GridSpec::uniform(4, 4, 1, 2), &[&[(0, 0, 0), (3, 3, 0)]]);
    let result = route(&db, &RouterConfig::default()).unwrap();
    assert_eq!(result.total_overflow, 0);
    assert_eq!(result.wirelength, 6);
    assert_eq!(result.via_count, 0);
    assert_eq!(result.unresolved, 0);
    verify_routes(&db, &result.nets).unwrap();
}

#[test]
fn single_two_pin_net_is_an_l_or_straight_wire() {
    let db = db_with(GridSpec::uniform(10, 10, 2, 8), &[&[(1, 2, 0), (7, 5, 0)]]);
    let result = route(&db, &RouterConfig::default()).unwrap();
    assert_eq!(result.total_overflow, 0);
    assert_eq!(result.layer_overflow, 0);
    assert_eq!(result.wirelength, 9);
    let wires: Vec<_> = result.nets[0]
        .segments
        .iter()
        .filter(|s| !s.is_via())
        .collect();
    assert!(!wires.is_empty() && wires.len() <= 2);
    assert!(result.nets[0].segments.iter().all(|s| s.is_well_formed()));
    verify_routes(&db, &result.nets).unwrap();
}

#[test]
fn bottleneck_reports_overflow_when_allowed() {
    let db = bottleneck();
    let result = route(&db, &RouterConfig::default()).unwrap();
    assert!(result.total_overflow >= 2);
    assert!(result.unresolved >= 2);
    // Still a connected, well-formed answer for every net.
    let report = verify_routes(&db, &result.nets).unwrap();
    assert_eq!(report.open_nets, 0);
}

#[test]
fn net_detours_around_a_narrowed_column() {
    // Rows 1 and 2 are closed between columns 1 and 2, so only rows 0 and 3 cross.
    let mut db = db_with(
        GridSpec::uniform(4, 4, 1, 1),
        &[
            &[(0, 0, 0), (3, 0, 0)],
            &[(0, 1, 0), (3, 1, 0)],
            &[(0, 2, 0), (3, 2, 0)],
        ],
    );
    for y in 1..3 {
        db.add_adjustment(GridCoord::new(1, y, 0), GridCoord::new(2, y, 0), 0);
    }
    let result = route(&db, &RouterConfig::default()).unwrap();
    assert_eq!(result.total_overflow, 1);
    let crosses_row_3 = result.nets.iter().any(|n| {
        n.segments
            .iter()
            .any(|s| !s.is_via() && s.init_y == 3 && s.final_y == 3 && s.length() > 0)
    });
    assert!(crosses_row_3);
    let report = verify_routes(&db, &result.nets).unwrap();
    assert_eq!(report.open_nets, 0);
}

#[test]
fn degree_ordering_still_routes_cleanly() {
    let db = generate_random_benchmark(&BenchmarkParams {
        x_grids: 16,
        y_grids: 16,
        layers: 2,
        capacity: 2,
        nets: 120,
        max_pins: 5,
        max_span: 8,
        blockages: 4,
        seed: 11,
    });
    let config = RouterConfig {
        ordering: false,
        maze_round: 20,
        ..RouterConfig::default()
    };
    let mut router = Router::new(&db, &config).unwrap();
    router.initial_route();
    let initial = router.overflow().total;
    router.maze_route();
    assert!(router.overflow().total <= initial);
    assert!(router.trees().iter().all(|t| t.is_consistent()));
    let result = router.finish().unwrap();
    let report = verify_routes(&db, &result.nets).unwrap();
    assert_eq!(report.open_nets, 0);
}

#[test]
fn bottleneck_fails_when_overflow_is_not_allowed() {
    let db = bottleneck();
    let config = RouterConfig {
        allow_overflow: false,
        ..RouterConfig::default()
    };
    match route(&db, &config) {
        Err(RouteError::UnresolvedOverflow { total, max }) => {
            assert!(total >= 2);
            assert!(max >= 1);
        }
        other => panic!(
            "expected unresolved overflow, got {:?}",
            other.map(|r| r.total_overflow)
        ),
    }
}

#[test]
fn maze_never_ends_worse_than_pattern_routing() {
    let db = generate_random_benchmark(&BenchmarkParams {
        x_grids: 16,
        y_grids: 16,
        layers: 2,
        capacity: 2,
        nets: 120,
        max_pins: 5,
        max_span: 8,
        blockages: 4,
        seed: 11,
    });
    let config = RouterConfig {
        maze_round: 20,
        ..RouterConfig::default()
    };
    let mut router = Router::new(&db, &config).unwrap();
    router.initial_route();
    let initial = router.overflow().total;
    router.maze_route();
    assert!(router.overflow().total <= initial);
    for tree in router.trees() {
        assert!(tree.is_consistent());
    }
}

#[test]
fn layer_usage_matches_planar_usage() {
    let db = generate_random_benchmark(&BenchmarkParams {
        x_grids: 20,
        y_grids: 20,
        layers: 4,
        capacity: 4,
        nets: 150,
        max_pins: 6,
        max_span: 10,
        blockages: 6,
        seed: 3,
    });
    let config = RouterConfig {
        maze_round: 40,
        ..RouterConfig::default()
    };
    let mut router = Router::new(&db, &config).unwrap();
    router.initial_route();
    router.maze_route();
    let planar_wl: u64 = router.trees().iter().map(|t| t.wirelength()).sum();
    assert_eq!(router.overflow().usage, planar_wl);

    let result = router.finish().unwrap();
    assert_eq!(result.wirelength, planar_wl);
    let report = verify_routes(&db, &result.nets).unwrap();
    assert_eq!(report.open_nets, 0);
    assert_eq!(report.wirelength, result.wirelength);
    assert_eq!(report.total_overflow, result.layer_overflow);
}

#[test]
fn adjustment_shrinks_layer_and_aggregate_capacity() {
    let mut db = db_with(GridSpec::uniform(4, 4, 2, 6), &[]);
    db.add_adjustment(GridCoord::new(1, 1, 0), GridCoord::new(2, 1, 0), 2);
    db.add_adjustment(GridCoord::new(1, 1, 0), GridCoord::new(2, 1, 0), 2);
    let router = Router::new(&db, &RouterConfig::default()).unwrap();
    let edges = router.edges();
    assert_eq!(
        edges.get_edge_capacity(GridCoord::new(1, 1, 0), GridCoord::new(2, 1, 0)),
        Some(2)
    );
    let h = edges.h_edge(1, 1);
    assert_eq!(h.cap, 2);
    assert_eq!(h.red, 4);
    assert_eq!(edges.h_edge(0, 1).cap, 6);
}

#[test]
fn degenerate_nets_get_no_segments() {
    let db = db_with(
        GridSpec::uniform(6, 6, 3, 4),
        &[
            &[(2, 2, 0)],
            &[(4, 1, 0), (4, 1, 2)],
            &[(0, 0, 0), (5, 0, 0)],
        ],
    );
    let result = route(&db, &RouterConfig::default()).unwrap();
    assert!(result.nets[0].segments.is_empty());
    assert!(result.nets[1].segments.is_empty());
    assert!(!result.nets[2].segments.is_empty());
    verify_routes(&db, &result.nets).unwrap();
}

#[test]
fn generated_benchmark_routes_and_verifies() {
    let db = generate_random_benchmark(&BenchmarkParams {
        x_grids: 24,
        y_grids: 24,
        layers: 4,
        capacity: 6,
        nets: 200,
        max_pins: 6,
        max_span: 10,
        blockages: 8,
        seed: 5,
    });
    let config = RouterConfig {
        max_segment_length: vec![6, 6, 0, 0],
        maze_round: 40,
        ..RouterConfig::default()
    };
    let result = route(&db, &config).unwrap();
    assert_eq!(result.nets.len(), db.nets.len());
    let report = verify_routes(&db, &result.nets).unwrap();
    assert_eq!(report.open_nets, 0);
}

struct FailingTopology;

impl TopologyGenerator for FailingTopology {
    fn generate(&self, req: &TopologyRequest<'_>) -> Result<Vec<Branch>> {
        Err(RouteError::InvalidGrid(format!("{} pins refused", req.pins.len())))
    }
}

#[test]
fn topology_failure_is_isolated_per_net() {
    let db = db_with(
        GridSpec::uniform(6, 6, 1, 4),
        &[&[(0, 0, 0), (5, 5, 0)], &[(3, 3, 0)]],
    );
    let mut router = Router::new(&db, &RouterConfig::default())
        .unwrap()
        .with_topology(Box::new(FailingTopology));
    router.initial_route();
    assert_eq!(router.states()[0], NetState::Abandoned);
    assert_eq!(router.states()[1], NetState::PatternRouted);
    router.maze_route();
    let result = router.finish().unwrap();
    assert!(result.nets[0].segments.is_empty());
    assert_eq!(result.unresolved, 1);
}
