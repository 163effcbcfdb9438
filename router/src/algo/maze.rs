//! Multi-source multi-destination maze search over the planar grid, and the tree edge
//! rerouting built on it.

use crate::grid::{Edge, EdgeModel};
use crate::ripup::ripup_check;
use crate::tree::StTree;
use grt_common::db::indices::{EdgeId, NodeId};
use grt_common::geom::coord::GridCoord;
use grt_common::geom::rect::Rect;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;

const SCALE: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostType {
    /// Logistic in the remaining capacity.
    Logistic,
    /// Logistic plus a linear term in the overflow.
    Slope,
}

/// The knobs the driver loop escalates between passes.
#[derive(Clone, Copy, Debug)]
pub struct MazeParams {
    pub cost_type: CostType,
    pub cost_height: f64,
    pub logistic_coef: f64,
    pub slope: f64,
    pub via_cost: f64,
    /// Weight of the congestion history.
    pub history_weight: f64,
    pub enlarge: u32,
    pub ripup_threshold: i32,
    pub mazeedge_threshold: u32,
}

impl MazeParams {
    /// Cost of one step across `e`, whose nominal aggregate capacity is `nominal`.
    pub fn step_cost(&self, e: &Edge, nominal: u32, alpha: f32) -> f64 {
        let cap = nominal as f64;
        let demand =
            e.usage as f64 + e.red as f64 + self.history_weight * e.last_usage as f64;
        let mut cost = self.cost_height / (((cap - demand) * self.logistic_coef).exp() + 1.0)
            + 1.0
            + alpha as f64;
        if self.cost_type == CostType::Slope && demand >= cap {
            cost += self.cost_height / self.slope * (demand - cap);
        }
        cost
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Start,
    Horizontal,
    Vertical,
}

/// Scratch buffers for repeated searches, tagged so a new search does not clear them.
pub struct MazeSearch {
    dist: Vec<i64>,
    parent: Vec<u32>,
    arrival: Vec<Arrival>,
    hyper_h: Vec<bool>,
    hyper_v: Vec<bool>,
    visited_tag: Vec<u32>,
    dest_tag: Vec<u32>,
    current_tag: u32,
    heap: PriorityQueue<u32, Reverse<i64>>,
}

impl Default for MazeSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl MazeSearch {
    pub fn new() -> Self {
        Self {
            dist: Vec::new(),
            parent: Vec::new(),
            arrival: Vec::new(),
            hyper_h: Vec::new(),
            hyper_v: Vec::new(),
            visited_tag: Vec::new(),
            dest_tag: Vec::new(),
            current_tag: 0,
            heap: PriorityQueue::new(),
        }
    }

    fn prepare(&mut self, size: usize) {
        if size > self.dist.len() {
            self.dist.resize(size, i64::MAX);
            self.parent.resize(size, u32::MAX);
            self.arrival.resize(size, Arrival::Start);
            self.hyper_h.resize(size, false);
            self.hyper_v.resize(size, false);
            self.visited_tag.resize(size, 0);
            self.dest_tag.resize(size, 0);
        }
        self.current_tag = self.current_tag.wrapping_add(1);
        if self.current_tag == 0 {
            self.visited_tag.fill(0);
            self.dest_tag.fill(0);
            self.current_tag = 1;
        }
        self.heap.clear();
    }

    #[inline(always)]
    fn visit(&mut self, i: usize, dist: i64, parent: u32, arrival: Arrival) {
        self.visited_tag[i] = self.current_tag;
        self.dist[i] = dist;
        self.parent[i] = parent;
        self.arrival[i] = arrival;
        self.hyper_h[i] = false;
        self.hyper_v[i] = false;
    }

    /// Changing direction costs a bend unless the cell was also reached as cheaply from
    /// the new direction.
    #[inline(always)]
    fn is_bend(&self, i: usize, dir: Arrival) -> bool {
        match (self.arrival[i], dir) {
            (Arrival::Start, _) => false,
            (a, d) if a == d => false,
            (_, Arrival::Horizontal) => !self.hyper_h[i],
            (_, Arrival::Vertical) => !self.hyper_v[i],
            (_, Arrival::Start) => false,
        }
    }

    /// Cheapest path inside `region` from any source to any destination. The search
    /// stops at the first destination taken off the frontier.
    pub fn find_path(
        &mut self,
        edges: &EdgeModel,
        region: Rect,
        sources: &[GridCoord],
        dests: &[GridCoord],
        params: &MazeParams,
        alpha: f32,
    ) -> Option<Vec<GridCoord>> {
        let w = region.width();
        self.prepare((w * region.height()) as usize);
        let local = |c: &GridCoord| ((c.y - region.min_y) * w + (c.x - region.min_x)) as usize;

        for d in dests.iter().filter(|d| region.contains(d.x, d.y)) {
            self.dest_tag[local(d)] = self.current_tag;
        }
        for s in sources.iter().filter(|s| region.contains(s.x, s.y)) {
            let i = local(s);
            if self.dest_tag[i] == self.current_tag {
                return Some(vec![GridCoord::planar(s.x, s.y)]);
            }
            self.visit(i, 0, u32::MAX, Arrival::Start);
            self.heap.push(i as u32, Reverse(0));
        }

        while let Some((idx, Reverse(d))) = self.heap.pop() {
            let i = idx as usize;
            if self.dest_tag[i] == self.current_tag {
                return Some(self.trace(i, region));
            }
            let here = GridCoord::planar(region.min_x + idx % w, region.min_y + idx / w);

            let mut neighbors = [(here, Arrival::Start); 4];
            let mut n_count = 0;
            if here.x > region.min_x {
                neighbors[n_count] = (GridCoord::planar(here.x - 1, here.y), Arrival::Horizontal);
                n_count += 1;
            }
            if here.x < region.max_x {
                neighbors[n_count] = (GridCoord::planar(here.x + 1, here.y), Arrival::Horizontal);
                n_count += 1;
            }
            if here.y > region.min_y {
                neighbors[n_count] = (GridCoord::planar(here.x, here.y - 1), Arrival::Vertical);
                n_count += 1;
            }
            if here.y < region.max_y {
                neighbors[n_count] = (GridCoord::planar(here.x, here.y + 1), Arrival::Vertical);
                n_count += 1;
            }

            for &(there, dir) in &neighbors[..n_count] {
                let Some((edir, eidx)) = edges.edge_between(here, there) else {
                    continue;
                };
                let edge = edges.edge(edir, eidx);
                let mut step = params.step_cost(edge, edges.nominal(edir), alpha);
                if self.is_bend(i, dir) {
                    step += params.via_cost;
                }
                let nd = d + (step * SCALE) as i64;
                let j = local(&there);
                if self.visited_tag[j] != self.current_tag || nd < self.dist[j] {
                    self.visit(j, nd, idx, dir);
                    self.heap.push_increase(j as u32, Reverse(nd));
                } else if nd == self.dist[j] && self.arrival[j] != dir {
                    match dir {
                        Arrival::Horizontal => self.hyper_h[j] = true,
                        Arrival::Vertical => self.hyper_v[j] = true,
                        Arrival::Start => {}
                    }
                }
            }
        }
        None
    }

    fn trace(&self, end: usize, region: Rect) -> Vec<GridCoord> {
        let w = region.width();
        let mut path = Vec::new();
        let mut cur = end as u32;
        loop {
            path.push(GridCoord::planar(
                region.min_x + cur % w,
                region.min_y + cur / w,
            ));
            let parent = self.parent[cur as usize];
            if parent == u32::MAX {
                break;
            }
            cur = parent;
        }
        path.reverse();
        path
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Not a rip-up candidate.
    Untouched,
    Rerouted,
    /// Ripped but no acceptable path was found; the old route is back in place.
    Failed,
}

/// Cells a search may start from on `node`'s side of `cut`: the whole routed component
/// inside the region when `node` is a movable Steiner point, otherwise the node itself.
fn side_cells(tree: &StTree, node: NodeId, cut: EdgeId, region: &Rect) -> Vec<GridCoord> {
    let pos = tree.pos(node);
    if !tree.is_steiner(node) || tree.nodes[node.index()].edges.len() != 3 {
        return vec![pos];
    }
    let (_, comp) = tree.component(node, cut);
    if comp.iter().any(|e| !tree.edges[e.index()].is_routed()) {
        return vec![pos];
    }
    let mut cells: Vec<GridCoord> = comp
        .iter()
        .flat_map(|e| tree.edges[e.index()].route.iter().copied())
        .filter(|c| region.contains(c.x, c.y))
        .collect();
    cells.push(pos);
    cells.sort_unstable();
    cells.dedup();
    cells
}

/// Rips up one congested tree edge and reconnects its two sides through the cheapest
/// path, moving Steiner ends onto the cells where the new path lands.
pub fn reroute_edge(
    tree: &mut StTree,
    e: EdgeId,
    edges: &mut EdgeModel,
    search: &mut MazeSearch,
    params: &MazeParams,
    alpha: f32,
) -> EdgeOutcome {
    let Some(saved) = ripup_check(
        tree,
        e,
        edges,
        params.ripup_threshold,
        params.mazeedge_threshold,
    ) else {
        return EdgeOutcome::Untouched;
    };

    let n1 = tree.edges[e.index()].n1;
    let n2 = tree.edges[e.index()].n2;
    let (p1, p2) = (tree.pos(n1), tree.pos(n2));
    let region = Rect::from_points(p1, p2).expand(params.enlarge, edges.x_grid, edges.y_grid);
    let sources = side_cells(tree, n1, e, &region);
    let dests = side_cells(tree, n2, e, &region);

    let found = search
        .find_path(edges, region, &sources, &dests, params, alpha)
        .filter(|path| {
            let (s, t) = (path[0], path[path.len() - 1]);
            (s.same_xy(&p1) || tree.can_relocate(n1, e, s))
                && (t.same_xy(&p2) || tree.can_relocate(n2, e, t))
        });

    let Some(path) = found else {
        edges.add_route_usage(&saved, 1);
        tree.set_route(e, saved);
        return EdgeOutcome::Failed;
    };

    let (s, t) = (path[0], path[path.len() - 1]);
    if !s.same_xy(&p1) {
        tree.relocate_steiner(n1, e, s);
    }
    if !t.same_xy(&p2) {
        tree.relocate_steiner(n2, e, t);
    }
    edges.add_route_usage(&path, 1);
    tree.set_route(e, path);
    EdgeOutcome::Rerouted
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetPass {
    pub rerouted: usize,
    pub failed: usize,
}

/// One rip-up and reroute pass over every edge of a tree.
pub fn reroute_net(
    tree: &mut StTree,
    edges: &mut EdgeModel,
    search: &mut MazeSearch,
    params: &MazeParams,
    alpha: f32,
) -> NetPass {
    let mut pass = NetPass::default();
    for e in tree.edge_ids() {
        match reroute_edge(tree, e, edges, search, params, alpha) {
            EdgeOutcome::Untouched => {}
            EdgeOutcome::Rerouted => pass.rerouted += 1,
            EdgeOutcome::Failed => pass.failed += 1,
        }
    }
    pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Net;
    use crate::steiner::Branch;
    use crate::twopin::polyline;
    use grt_common::db::core::{GridSpec, NetData};
    use grt_common::db::indices::NetId;

    fn params() -> MazeParams {
        MazeParams {
            cost_type: CostType::Slope,
            cost_height: 4.0,
            logistic_coef: 0.7,
            slope: 20.0,
            via_cost: 2.0,
            history_weight: 1.0,
            enlarge: 4,
            ripup_threshold: 0,
            mazeedge_threshold: 0,
        }
    }

    fn full_region(edges: &EdgeModel) -> Rect {
        Rect::new(0, edges.x_grid - 1, 0, edges.y_grid - 1)
    }

    #[test]
    fn straight_search_on_an_empty_grid() {
        let edges = EdgeModel::new(&GridSpec::uniform(6, 6, 1, 4));
        let mut search = MazeSearch::new();
        let path = search
            .find_path(
                &edges,
                full_region(&edges),
                &[GridCoord::planar(0, 2)],
                &[GridCoord::planar(5, 2)],
                &params(),
                0.0,
            )
            .unwrap();
        assert_eq!(path, polyline(&[(0, 2), (5, 2)]));
    }

    #[test]
    fn first_destination_reached_wins() {
        let edges = EdgeModel::new(&GridSpec::uniform(8, 8, 1, 4));
        let mut search = MazeSearch::new();
        let path = search
            .find_path(
                &edges,
                full_region(&edges),
                &[GridCoord::planar(0, 0), GridCoord::planar(7, 7)],
                &[GridCoord::planar(5, 7), GridCoord::planar(0, 4)],
                &params(),
                0.0,
            )
            .unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], GridCoord::planar(7, 7));
        assert_eq!(path[2], GridCoord::planar(5, 7));
    }

    #[test]
    fn detours_around_a_blocked_edge() {
        let grid = GridSpec::uniform(5, 3, 1, 4);
        let mut edges = EdgeModel::new(&grid);
        edges.add_route_usage(&polyline(&[(1, 1), (2, 1)]), 40);
        let cheap_bends = MazeParams {
            via_cost: 0.5,
            ..params()
        };
        let mut search = MazeSearch::new();
        let path = search
            .find_path(
                &edges,
                full_region(&edges),
                &[GridCoord::planar(0, 1)],
                &[GridCoord::planar(4, 1)],
                &cheap_bends,
                0.0,
            )
            .unwrap();
        assert_eq!(path.len(), 7);
        assert!(!path.windows(2).any(|w| {
            (w[0] == GridCoord::planar(1, 1) && w[1] == GridCoord::planar(2, 1))
                || (w[0] == GridCoord::planar(2, 1) && w[1] == GridCoord::planar(1, 1))
        }));
    }

    #[test]
    fn shared_cell_gives_a_zero_length_path() {
        let edges = EdgeModel::new(&GridSpec::uniform(4, 4, 1, 1));
        let mut search = MazeSearch::new();
        let c = GridCoord::planar(2, 2);
        let path = search
            .find_path(&edges, full_region(&edges), &[c], &[c], &params(), 0.0)
            .unwrap();
        assert_eq!(path, vec![c]);
    }

    #[test]
    fn slope_cost_grows_with_overflow() {
        let p = params();
        let mut e = Edge {
            cap: 2,
            ..Default::default()
        };
        let free = p.step_cost(&e, 2, 0.0);
        e.usage = 2;
        let full = p.step_cost(&e, 2, 0.0);
        e.usage = 4;
        let over = p.step_cost(&e, 2, 0.0);
        assert!(free < full && full < over);
        let logistic = MazeParams {
            cost_type: CostType::Logistic,
            ..p
        };
        assert!(logistic.step_cost(&e, 2, 0.0) < over);
    }

    #[test]
    fn reroute_moves_the_steiner_point_and_keeps_usage_consistent() {
        let grid = GridSpec::uniform(8, 8, 1, 1);
        let mut edges = EdgeModel::new(&grid);
        let data = NetData {
            name: "t".to_string(),
            id: 0,
            pins: vec![
                GridCoord::new(0, 0, 0),
                GridCoord::new(6, 0, 0),
                GridCoord::new(3, 4, 0),
            ],
            alpha: 0.0,
        };
        let net = Net::from_data(NetId::new(0), &data, &grid).unwrap();
        let branches = [
            Branch { x: 0, y: 0, n: 0 },
            Branch { x: 6, y: 0, n: 3 },
            Branch { x: 3, y: 4, n: 3 },
            Branch { x: 3, y: 0, n: 0 },
        ];
        let mut tree = StTree::from_branches(&net, &branches).unwrap();
        for e in tree.edge_ids() {
            let edge = &tree.edges[e.index()];
            let a = tree.pos(edge.n1);
            let b = tree.pos(edge.n2);
            let path = polyline(&[(a.x, a.y), (b.x, a.y), (b.x, b.y)]);
            edges.add_route_usage(&path, 1);
            tree.set_route(e, path);
        }
        // Congest the vertical leg from the Steiner point up to pin 2.
        let leg = polyline(&[(3, 0), (3, 4)]);
        edges.add_route_usage(&leg, 3);

        let mut search = MazeSearch::new();
        let cut = tree.nodes[2].edges[0];
        let outcome = reroute_edge(&mut tree, cut, &mut edges, &mut search, &params(), 0.0);
        assert_eq!(outcome, EdgeOutcome::Rerouted);
        assert!(tree.is_consistent());
        assert_eq!(tree.nodes[3].edges.len(), 3);
        assert_ne!(tree.pos(NodeId::new(3)), GridCoord::planar(3, 0));
        let route = &tree.edges[cut.index()].route;
        assert!(!route.windows(2).any(|w| w[0].x == 3 && w[1].x == 3));

        // Usage is the congesting leg plus every routed step of the tree.
        let steps: u64 = tree.edges.iter().map(|e| e.len as u64).sum();
        assert_eq!(steps, 11);
        assert_eq!(edges.overflow_2d().usage, steps + 12);
        assert_eq!(edges.overflow_2d().total, 8);
    }

    #[test]
    fn reroute_net_skips_healthy_edges() {
        let grid = GridSpec::uniform(4, 4, 1, 2);
        let mut edges = EdgeModel::new(&grid);
        let data = NetData {
            name: "t".to_string(),
            id: 0,
            pins: vec![GridCoord::new(0, 0, 0), GridCoord::new(3, 3, 0)],
            alpha: 0.0,
        };
        let net = Net::from_data(NetId::new(0), &data, &grid).unwrap();
        let branches = [Branch { x: 0, y: 0, n: 1 }, Branch { x: 3, y: 3, n: 1 }];
        let mut tree = StTree::from_branches(&net, &branches).unwrap();
        let path = polyline(&[(0, 0), (3, 0), (3, 3)]);
        edges.add_route_usage(&path, 1);
        tree.set_route(EdgeId::new(0), path);

        let mut search = MazeSearch::new();
        let pass = reroute_net(&mut tree, &mut edges, &mut search, &params(), 0.0);
        assert_eq!(pass, NetPass::default());
        assert_eq!(tree.wirelength(), 6);
    }
}
