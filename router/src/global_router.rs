use crate::algo::maze::{CostType, MazeParams, MazeSearch, NetPass, reroute_net};
use crate::grid::{EdgeModel, OverflowStats};
use crate::layer_assign::LayerAssigner;
use crate::net::Net;
use crate::rc_tree::{SteinerTree, repair_long_segments};
use crate::steiner::{CongestionMap, RectilinearSteiner, TopologyGenerator, TopologyRequest};
use crate::tree::StTree;
use crate::twopin::{best_z, commit_l, l_path, monotonic, spread_estimate};
use crate::utils::conversion::layout_to_segments;
use grt_common::db::core::{GridSpec, NetRoute, RoutingDB};
use grt_common::db::indices::NetId;
use grt_common::error::{Result, RouteError};
use grt_common::geom::coord::GridCoord;
use grt_common::util::config::RouterConfig;
use grt_common::util::profiler::ScopedTimer;
use rayon::prelude::*;
use std::time::Instant;

/// Extra cost per unit of estimated utilisation when stretching coordinates for
/// congestion-driven topologies.
const CONGESTION_WEIGHT: f32 = 1.0;

// Region and steepness increments of the main loop, picked by the current overflow.
const ENLARGE_STEP_HIGH: u32 = 10;
const ENLARGE_STEP_MID: u32 = 5;
const ENLARGE_STEP_LOW: u32 = 5;
const COST_STEP_HIGH: f64 = 2.0;
const COST_STEP_MID: f64 = 2.0;
const COST_STEP_LOW: f64 = 5.0;
const HIGH_OVERFLOW: u64 = 2000;
const LOW_OVERFLOW: u64 = 500;
const HISTORY_STOP_DECAY: u64 = 1000;
/// Iteration at which the loop switches to the slope cost and skips history once.
const SLOPE_ITERATION: usize = 8;
const FINAL_SLOPE: f64 = 5.0;

/// Where a net stands in the rip-up and reroute flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetState {
    Unrouted,
    PatternRouted,
    RippedUp,
    MazeRouted,
    Converged,
    /// Still crosses an overflowing edge, or was rejected on input; keeps its last route.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct RoutingResult {
    pub nets: Vec<NetRoute>,
    pub total_overflow: u64,
    pub max_overflow: u32,
    /// Summed per-layer overflow after layer assignment.
    pub layer_overflow: u64,
    pub wirelength: u64,
    pub via_count: u64,
    /// Nets left abandoned.
    pub unresolved: usize,
}

struct Snapshot {
    trees: Vec<StTree>,
    total: u64,
    max: u32,
}

pub struct Router {
    config: RouterConfig,
    grid: GridSpec,
    edges: EdgeModel,
    /// One entry per input net, in input order. Rejected nets have degree 0.
    nets: Vec<Net>,
    trees: Vec<StTree>,
    states: Vec<NetState>,
    search: MazeSearch,
    topology: Box<dyn TopologyGenerator>,
}

impl Router {
    /// Validates the grid, applies capacity adjustments and converts the input nets.
    /// A malformed adjustment or net is logged and skipped.
    pub fn new(db: &RoutingDB, config: &RouterConfig) -> Result<Self> {
        db.grid.validate()?;
        let mut edges = EdgeModel::new(&db.grid);
        for adj in &db.adjustments {
            if let Err(e) = edges.add_adjustment(adj) {
                log::warn!("Skipping capacity adjustment: {}", e);
            }
        }

        let mut nets = Vec::with_capacity(db.nets.len());
        let mut states = Vec::with_capacity(db.nets.len());
        for (i, data) in db.nets.iter().enumerate() {
            match Net::from_data(NetId::new(i), data, &db.grid) {
                Ok(net) => {
                    nets.push(net);
                    states.push(NetState::Unrouted);
                }
                Err(e) => {
                    log::warn!("Skipping net: {}", e);
                    nets.push(Net {
                        id: NetId::new(i),
                        name: data.name.clone(),
                        ext_id: data.id,
                        num_pins: data.pins.len(),
                        deg: 0,
                        pin_x: Vec::new(),
                        pin_y: Vec::new(),
                        pin_l: Vec::new(),
                        alpha: data.alpha,
                    });
                    states.push(NetState::Abandoned);
                }
            }
        }
        log::info!(
            "Router: {}x{} grid, {} layers, {} nets ({} adjustments)",
            db.grid.x_grids,
            db.grid.y_grids,
            db.grid.num_layers(),
            nets.len(),
            db.adjustments.len()
        );

        Ok(Self {
            config: config.clone(),
            grid: db.grid.clone(),
            edges,
            trees: vec![StTree::empty(); nets.len()],
            nets,
            states,
            search: MazeSearch::new(),
            topology: Box::new(RectilinearSteiner::default()),
        })
    }

    pub fn with_topology(mut self, topology: Box<dyn TopologyGenerator>) -> Self {
        self.topology = topology;
        self
    }

    pub fn edges(&self) -> &EdgeModel {
        &self.edges
    }

    pub fn trees(&self) -> &[StTree] {
        &self.trees
    }

    pub fn states(&self) -> &[NetState] {
        &self.states
    }

    pub fn overflow(&self) -> OverflowStats {
        self.edges.overflow_2d()
    }

    /// The whole flow: pattern routing, rip-up and reroute, layer assignment.
    pub fn run(mut self) -> Result<RoutingResult> {
        let timer = ScopedTimer::new("Global routing");
        self.initial_route();
        self.maze_route();
        log::info!("2D routing finished after {}ms", timer.elapsed_ms());
        self.finish()
    }

    /// Builds every tree and routes it with pattern shapes only.
    pub fn initial_route(&mut self) {
        let _t = ScopedTimer::new("Initial routing");
        let all: Vec<usize> = (0..self.nets.len()).collect();
        for (idx, tree) in self.generate_trees(&all, None, false) {
            match tree {
                Some(tree) => self.trees[idx] = tree,
                None => self.states[idx] = NetState::Abandoned,
            }
        }

        self.edges.clear_est_usage();
        for idx in 0..self.trees.len() {
            self.tree_estimate(idx, 1.0);
        }

        if self.has_estimated_overflow() {
            self.regenerate_congested();
        }

        for idx in 0..self.trees.len() {
            for e in self.trees[idx].edge_ids() {
                let edge = &self.trees[idx].edges[e.index()];
                let (a, b) = (edge.n1, edge.n2);
                let (pa, pb) = (self.trees[idx].pos(a), self.trees[idx].pos(b));
                let path = commit_l(&mut self.edges, (pa.x, pa.y), (pb.x, pb.y));
                self.trees[idx].set_route(e, path);
            }
            if self.states[idx] == NetState::Unrouted {
                self.states[idx] = NetState::PatternRouted;
            }
        }
        self.recompute_usage();
        self.edges.sync_est_usage();
        log::info!("L routing: {}", describe(&self.overflow()));

        for round in 0..self.config.z_route_rounds {
            let moved = self.improve_pieces(0, best_z);
            log::info!(
                "Z routing round {}: {} pieces moved, {}",
                round,
                moved,
                describe(&self.overflow())
            );
        }

        let threshold = self.config.monotonic_threshold.max(1) as i32 - 1;
        let moved = self.improve_pieces(threshold, monotonic);
        log::info!(
            "Monotonic routing: {} pieces moved, {}",
            moved,
            describe(&self.overflow())
        );
    }

    /// Topologies for the nets in `indices`, computed in parallel. `None` marks a net
    /// whose generator failed or returned an invalid tree.
    fn generate_trees(
        &self,
        indices: &[usize],
        congestion: Option<&CongestionMap>,
        reroute: bool,
    ) -> Vec<(usize, Option<StTree>)> {
        let topology = self.topology.as_ref();
        let nets = &self.nets;
        let states = &self.states;
        indices
            .par_iter()
            .map(|&idx| {
                let net = &nets[idx];
                if net.deg < 2 || states[idx] == NetState::Abandoned {
                    return (idx, Some(StTree::empty()));
                }
                let pins = net.pins_xy();
                let req = TopologyRequest {
                    pins: &pins,
                    congestion,
                    reroute,
                };
                let tree = topology
                    .generate(&req)
                    .and_then(|branches| StTree::from_branches(net, &branches));
                match tree {
                    Ok(tree) => (idx, Some(tree)),
                    Err(e) => {
                        log::warn!("Net {} skipped: {}", net.name, e);
                        (idx, None)
                    }
                }
            })
            .collect()
    }

    fn tree_estimate(&mut self, idx: usize, sign: f32) {
        let tree = &self.trees[idx];
        for edge in &tree.edges {
            let (a, b) = (tree.pos(edge.n1), tree.pos(edge.n2));
            spread_estimate(&mut self.edges, (a.x, a.y), (b.x, b.y), sign);
        }
    }

    fn has_estimated_overflow(&self) -> bool {
        self.edges.edge_ids().any(|(dir, idx)| {
            let e = self.edges.edge(dir, idx);
            e.est_usage > e.cap as f32
        })
    }

    /// Rebuilds the multi-pin trees whose pieces cross an over-estimated edge, on
    /// coordinates stretched by the estimated congestion.
    fn regenerate_congested(&mut self) {
        let _t = ScopedTimer::new("Congestion-driven topologies");
        let edges = &self.edges;
        let over = |a: GridCoord, b: GridCoord| {
            edges.edge_between(a, b).is_some_and(|(dir, i)| {
                let e = edges.edge(dir, i);
                e.est_usage > e.cap as f32
            })
        };
        let hot: Vec<usize> = self
            .trees
            .par_iter()
            .enumerate()
            .filter(|(_, tree)| tree.deg >= 3)
            .filter(|(_, tree)| {
                tree.edges.iter().any(|edge| {
                    let (a, b) = (tree.pos(edge.n1), tree.pos(edge.n2));
                    [true, false].iter().any(|&hf| {
                        l_path((a.x, a.y), (b.x, b.y), hf)
                            .windows(2)
                            .any(|w| over(w[0], w[1]))
                    })
                })
            })
            .map(|(idx, _)| idx)
            .collect();
        if hot.is_empty() {
            return;
        }

        let map = CongestionMap::from_edges(&self.edges, CONGESTION_WEIGHT);
        let rebuilt = self.generate_trees(&hot, Some(&map), true);
        let mut replaced = 0;
        for (idx, tree) in rebuilt {
            let Some(tree) = tree else {
                continue;
            };
            self.tree_estimate(idx, -1.0);
            self.trees[idx] = tree;
            self.tree_estimate(idx, 1.0);
            replaced += 1;
        }
        log::info!("Regenerated {} of {} congested trees", replaced, hot.len());
    }

    /// Reroutes every piece crossing an edge congested beyond `threshold` with
    /// `shape`, which sees the usage without the piece itself. Returns the number of
    /// pieces whose route changed.
    fn improve_pieces(
        &mut self,
        threshold: i32,
        shape: fn(&EdgeModel, (u32, u32), (u32, u32)) -> Vec<GridCoord>,
    ) -> usize {
        let mut moved = 0;
        for idx in 0..self.trees.len() {
            for e in self.trees[idx].edge_ids() {
                let edge = &self.trees[idx].edges[e.index()];
                if edge.route.len() < 2 {
                    continue;
                }
                let congested = edge.route.windows(2).any(|w| {
                    self.edges
                        .edge_between(w[0], w[1])
                        .is_some_and(|(dir, i)| self.edges.is_congested(dir, i, threshold))
                });
                if !congested {
                    continue;
                }
                let old = edge.route.clone();
                let (a, b) = (old[0], old[old.len() - 1]);
                self.edges.add_route_usage(&old, -1);
                let path = shape(&self.edges, (a.x, a.y), (b.x, b.y));
                self.edges.add_route_usage(&path, 1);
                if path != old {
                    moved += 1;
                }
                self.trees[idx].set_route(e, path);
            }
        }
        moved
    }

    fn recompute_usage(&mut self) {
        self.edges.clear_usage();
        for tree in &self.trees {
            for edge in &tree.edges {
                self.edges.add_route_usage(&edge.route, 1);
            }
        }
    }

    /// Nets worth a maze pass, most congested first (or highest degree first when
    /// congestion ordering is off).
    fn net_order(&self, threshold: i32) -> Vec<usize> {
        let edges = &self.edges;
        let mut scored: Vec<(usize, u64)> = self
            .trees
            .par_iter()
            .enumerate()
            .map(|(idx, tree)| {
                let score: u64 = tree
                    .edges
                    .iter()
                    .flat_map(|e| e.route.windows(2))
                    .filter_map(|w| edges.edge_between(w[0], w[1]))
                    .filter(|&(dir, i)| edges.is_congested(dir, i, threshold))
                    .map(|(dir, i)| edges.edge(dir, i).overflow() as u64 + 1)
                    .sum();
                (idx, score)
            })
            .filter(|&(_, score)| score > 0)
            .collect();
        if self.config.ordering {
            scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        } else {
            let nets = &self.nets;
            scored.sort_by(|a, b| nets[b.0].deg.cmp(&nets[a.0].deg).then(a.0.cmp(&b.0)));
        }
        scored.into_iter().map(|(idx, _)| idx).collect()
    }

    fn maze_pass(&mut self, params: &MazeParams) -> NetPass {
        let mut total = NetPass::default();
        for idx in self.net_order(params.ripup_threshold) {
            let previous = self.states[idx];
            self.states[idx] = NetState::RippedUp;
            let pass = reroute_net(
                &mut self.trees[idx],
                &mut self.edges,
                &mut self.search,
                params,
                self.nets[idx].alpha,
            );
            self.states[idx] = if pass.rerouted > 0 {
                NetState::MazeRouted
            } else {
                previous
            };
            total.rerouted += pass.rerouted;
            total.failed += pass.failed;
        }
        total
    }

    fn snapshot(&self, stats: &OverflowStats) -> Snapshot {
        Snapshot {
            trees: self.trees.clone(),
            total: stats.total,
            max: stats.max,
        }
    }

    /// Rip-up and reroute until the overflow is gone, stops improving, or the round
    /// limit is hit. Leaves the best routing seen in place.
    pub fn maze_route(&mut self) {
        let _t = ScopedTimer::new("Maze routing");
        let cfg = self.config.clone();
        let mut stats = self.overflow();
        if stats.total == 0 {
            self.settle_states();
            return;
        }

        let mut params = MazeParams {
            cost_type: CostType::Logistic,
            cost_height: cfg.cost_height,
            logistic_coef: cfg.logistic_coef,
            slope: cfg.slope,
            via_cost: cfg.via_cost,
            history_weight: 1.0,
            enlarge: cfg.enlarge,
            ripup_threshold: cfg.ripup_threshold,
            mazeedge_threshold: cfg.mazeedge_threshold,
        };
        let mut thresh_m = cfg.mazeedge_threshold;
        if stats.max > cfg.big_overflow {
            log::info!(
                "Max overflow {} above {}: aggressive tuning",
                stats.max,
                cfg.big_overflow
            );
            params.cost_height *= 2.0;
            params.logistic_coef = cfg.aggressive_logistic_coef;
            params.via_cost = 0.0;
            thresh_m = 0;
        }
        let grid_span = self.edges.x_grid.max(self.edges.y_grid);

        let mut best = self.snapshot(&stats);
        for i in 0..cfg.lv_iterations {
            if stats.total == 0 {
                break;
            }
            params.logistic_coef = params.logistic_coef.max(logistic_for(stats.max));
            params.mazeedge_threshold = thresh_m;
            let start = Instant::now();
            let pass = self.maze_pass(&params);
            stats = self.overflow();
            log::info!(
                "Maze pass {}: rerouted {}, failed {}, {}, {}ms",
                i,
                pass.rerouted,
                pass.failed,
                describe(&stats),
                start.elapsed().as_millis()
            );
            if stats.total < best.total {
                best = self.snapshot(&stats);
            }
        }

        let mut bwcnt = 0usize;
        let mut iteration = 0usize;
        let base_via = params.via_cost;

        while stats.total > 0 && iteration < cfg.maze_round {
            let start = Instant::now();
            thresh_m = if thresh_m > 15 {
                thresh_m - 10
            } else {
                thresh_m.saturating_sub(4)
            };
            params.mazeedge_threshold = thresh_m;

            if stats.total > HIGH_OVERFLOW {
                params.enlarge += ENLARGE_STEP_HIGH;
                params.cost_height += COST_STEP_HIGH;
            } else if stats.total < LOW_OVERFLOW {
                params.enlarge += ENLARGE_STEP_LOW;
                params.cost_height += COST_STEP_LOW;
                params.ripup_threshold = -1;
            } else {
                params.enlarge += ENLARGE_STEP_MID;
                params.cost_height += COST_STEP_MID;
            }
            params.history_weight = 1.0;
            if stats.total > cfg.huge_overflow {
                params.enlarge = params.enlarge.max(grid_span / 30);
                params.history_weight = 0.0;
            }
            params.enlarge = params.enlarge.min(grid_span / 2);
            params.logistic_coef = params.logistic_coef.max(logistic_for(stats.max));

            if iteration == SLOPE_ITERATION {
                params.cost_type = CostType::Slope;
                params.history_weight = 0.0;
            }
            if stats.max == 1 {
                params.ripup_threshold = -1;
                params.cost_type = CostType::Slope;
                params.slope = FINAL_SLOPE;
            }
            params.via_cost = if bwcnt > cfg.stagnation_limit / 2 {
                0.0
            } else {
                base_via
            };

            self.edges
                .update_history(stats.total < HISTORY_STOP_DECAY, cfg.history_decay);
            let pass = self.maze_pass(&params);
            stats = self.overflow();
            iteration += 1;

            if stats.total < best.total {
                best = self.snapshot(&stats);
                bwcnt = 0;
            } else {
                bwcnt += 1;
            }

            log::info!(
                "Maze iter {}: rerouted {}, failed {}, {}, best {}, enlarge {}, {}ms",
                iteration,
                pass.rerouted,
                pass.failed,
                describe(&stats),
                best.total,
                params.enlarge,
                start.elapsed().as_millis()
            );

            if bwcnt > cfg.stagnation_limit && best.total <= cfg.overflow_floor {
                log::info!(
                    "No improvement for {} iterations at overflow {}; stopping",
                    bwcnt,
                    best.total
                );
                break;
            }
        }

        if stats.total > best.total {
            self.restore(best);
        }
        self.settle_states();
    }

    /// Puts back the trees of `best` and rebuilds 2D usage from their routes. History
    /// is left as it is.
    fn restore(&mut self, best: Snapshot) {
        log::info!(
            "Restoring best routing (overflow {}, max {})",
            best.total,
            best.max
        );
        self.trees = best.trees;
        self.recompute_usage();
    }

    /// Marks each net converged or abandoned by whether its route still crosses an
    /// overflowing edge.
    fn settle_states(&mut self) {
        let edges = &self.edges;
        let overflowing: Vec<bool> = self
            .trees
            .par_iter()
            .map(|tree| {
                tree.edges
                    .iter()
                    .flat_map(|e| e.route.windows(2))
                    .filter_map(|w| edges.edge_between(w[0], w[1]))
                    .any(|(dir, i)| edges.edge(dir, i).overflow() > 0)
            })
            .collect();
        for (idx, over) in overflowing.into_iter().enumerate() {
            // Nets that never got a tree stay abandoned.
            if self.states[idx] == NetState::Abandoned && self.trees[idx].edges.is_empty() {
                continue;
            }
            self.states[idx] = if over {
                NetState::Abandoned
            } else {
                NetState::Converged
            };
        }
    }

    /// Layer assignment, segment output and wire-length repair.
    pub fn finish(mut self) -> Result<RoutingResult> {
        let stats = self.overflow();
        let unresolved = self
            .states
            .iter()
            .filter(|&&s| s == NetState::Abandoned)
            .count();
        if stats.total > 0 {
            if !self.config.allow_overflow {
                log::error!(
                    "{} nets still overflow (total {}, max {})",
                    unresolved,
                    stats.total,
                    stats.max
                );
                return Err(RouteError::UnresolvedOverflow {
                    total: stats.total,
                    max: stats.max,
                });
            }
            log::warn!(
                "Routing finished with overflow {} (max {}) on {} nets",
                stats.total,
                stats.max,
                unresolved
            );
        }

        let _t = ScopedTimer::new("Layer assignment");
        let mut order: Vec<usize> = (0..self.nets.len()).collect();
        order.sort_by_key(|&idx| (self.trees[idx].wirelength(), idx));

        self.edges.clear_usage_3d();
        let assigner = LayerAssigner::new(&self.grid, self.config.layer_via_cost);
        let mut segments = vec![Vec::new(); self.nets.len()];
        for &idx in &order {
            let layout =
                assigner.assign_net(&self.nets[idx], &self.trees[idx], &mut self.edges);
            segments[idx] = layout_to_segments(&layout);
        }

        if !self.config.max_segment_length.is_empty() {
            let mut moved = 0;
            for &idx in &order {
                if segments[idx].is_empty() {
                    continue;
                }
                let tree =
                    SteinerTree::build(&self.nets[idx], std::mem::take(&mut segments[idx]));
                let (repaired, n) = repair_long_segments(
                    &tree,
                    &self.grid,
                    &self.config.max_segment_length,
                    &mut self.edges,
                );
                segments[idx] = repaired;
                moved += n;
            }
            log::info!("Moved {} over-length wires", moved);
        }

        let layer_stats = self.edges.overflow_3d();
        let nets: Vec<NetRoute> = self
            .nets
            .iter()
            .zip(segments)
            .map(|(net, segments)| NetRoute {
                name: net.name.clone(),
                id: net.ext_id,
                segments,
            })
            .collect();
        let wirelength = nets.iter().map(|n| n.wirelength()).sum();
        let via_count = nets.iter().map(|n| n.via_count()).sum();

        log::info!(
            "Routing done: WL {}, vias {}, 2D overflow {} (max {}), layer overflow {}",
            wirelength,
            via_count,
            stats.total,
            stats.max,
            layer_stats.total
        );

        Ok(RoutingResult {
            nets,
            total_overflow: stats.total,
            max_overflow: stats.max,
            layer_overflow: layer_stats.total,
            wirelength,
            via_count,
            unresolved,
        })
    }
}

fn logistic_for(max_overflow: u32) -> f64 {
    2.0 / (1.0 + (max_overflow.max(1) as f64).ln())
}

fn describe(stats: &OverflowStats) -> String {
    format!(
        "overflow {} (H {}, V {}, max {}, {} edges)",
        stats.total, stats.h_total, stats.v_total, stats.max, stats.overflowed_edges
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twopin::polyline;

    fn db_with(grid: GridSpec, nets: &[&[(u32, u32, u8)]]) -> RoutingDB {
        let mut db = RoutingDB::new(grid);
        for (i, pins) in nets.iter().enumerate() {
            db.add_net(
                format!("n{}", i),
                pins.iter().map(|&(x, y, z)| GridCoord::new(x, y, z)).collect(),
            );
        }
        db
    }

    #[test]
    fn initial_routes_connect_every_edge() {
        let db = db_with(
            GridSpec::uniform(8, 8, 2, 4),
            &[&[(0, 0, 0), (5, 3, 0), (2, 7, 0)], &[(1, 1, 0), (6, 1, 0)]],
        );
        let mut router = Router::new(&db, &RouterConfig::default()).unwrap();
        router.initial_route();
        for tree in router.trees() {
            assert!(tree.is_consistent());
            for edge in &tree.edges {
                let (a, b) = (tree.pos(edge.n1), tree.pos(edge.n2));
                assert_eq!(edge.route.first().copied(), Some(a));
                assert_eq!(edge.route.last().copied(), Some(b));
                assert_eq!(edge.len, a.manhattan(&b));
            }
        }
        assert!(router.states().iter().all(|&s| s == NetState::PatternRouted));
    }

    #[test]
    fn rejected_net_is_abandoned_and_kept_in_output() {
        let db = db_with(
            GridSpec::uniform(4, 4, 1, 2),
            &[&[(0, 0, 0), (9, 9, 0)], &[(0, 0, 0), (3, 0, 0)]],
        );
        let mut router = Router::new(&db, &RouterConfig::default()).unwrap();
        assert_eq!(router.states()[0], NetState::Abandoned);
        router.initial_route();
        router.maze_route();
        assert_eq!(router.states()[0], NetState::Abandoned);
        assert_eq!(router.states()[1], NetState::Converged);
        let result = router.finish().unwrap();
        assert_eq!(result.nets.len(), 2);
        assert!(result.nets[0].segments.is_empty());
        assert_eq!(result.unresolved, 1);
        assert_eq!(result.wirelength, 3);
    }

    #[test]
    fn restore_brings_back_the_best_trees_and_usage() {
        let db = db_with(
            GridSpec::uniform(4, 4, 1, 1),
            &[&[(0, 0, 0), (3, 0, 0)], &[(0, 1, 0), (3, 1, 0)]],
        );
        let mut router = Router::new(&db, &RouterConfig::default()).unwrap();
        router.initial_route();
        let stats = router.overflow();
        assert_eq!(stats.total, 0);
        let best = router.snapshot(&stats);

        // Push net 0 onto row 1 so it collides with net 1.
        let e = router.trees[0]
            .edge_ids()
            .find(|&e| router.trees[0].edges[e.index()].is_routed())
            .unwrap();
        let original = router.trees[0].edges[e.index()].route.clone();
        let edge = &router.trees[0].edges[e.index()];
        let (a, b) = (router.trees[0].pos(edge.n1), router.trees[0].pos(edge.n2));
        let detour = polyline(&[(a.x, a.y), (a.x, 1), (b.x, 1), (b.x, b.y)]);
        crate::ripup::ripup(&mut router.trees[0], e, &mut router.edges);
        router.edges.add_route_usage(&detour, 1);
        router.trees[0].set_route(e, detour);
        assert_eq!(router.overflow().total, 3);

        router.restore(best);
        let stats = router.overflow();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.usage, 6);
        assert_eq!(router.trees()[0].edges[e.index()].route, original);
    }

    #[test]
    fn degree_order_when_congestion_ordering_is_off() {
        let db = db_with(
            GridSpec::uniform(8, 8, 1, 1),
            &[
                &[(0, 0, 0), (7, 0, 0)],
                &[(0, 3, 0), (1, 3, 0), (0, 4, 0), (1, 4, 0)],
                &[(0, 6, 0), (2, 6, 0), (1, 7, 0)],
            ],
        );
        let mut router = Router::new(&db, &RouterConfig::default()).unwrap();
        router.initial_route();
        // Every routed edge is full at capacity one.
        assert_eq!(router.net_order(-1)[0], 0);

        let config = RouterConfig {
            ordering: false,
            ..RouterConfig::default()
        };
        let mut router = Router::new(&db, &config).unwrap();
        router.initial_route();
        assert_eq!(router.net_order(-1), vec![1, 2, 0]);
    }

    #[test]
    fn logistic_coefficient_shrinks_with_overflow() {
        assert_eq!(logistic_for(0), 2.0);
        assert_eq!(logistic_for(1), 2.0);
        assert!(logistic_for(100) < 0.5);
    }
}
