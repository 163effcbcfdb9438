//! Arena-indexed routing tree of one net.
//!
//! Nodes `0..deg` are the pins, in net pin order; the rest are Steiner points. An edge
//! route is the ordered list of planar cells from `n1` to `n2`; an empty route means the
//! edge is not routed, a single cell means both ends coincide.

use crate::net::Net;
use crate::steiner::Branch;
use grt_common::db::indices::{EdgeId, NodeId};
use grt_common::error::{Result, RouteError};
use grt_common::geom::coord::GridCoord;
use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub struct TreeNode {
    pub x: u32,
    pub y: u32,
    pub edges: Vec<EdgeId>,
}

#[derive(Clone, Debug)]
pub struct TreeEdge {
    pub n1: NodeId,
    pub n2: NodeId,
    /// Routed length in grid steps; Manhattan distance of the ends while unrouted.
    pub len: u32,
    pub route: Vec<GridCoord>,
}

impl TreeEdge {
    pub fn is_routed(&self) -> bool {
        !self.route.is_empty()
    }

    pub fn other(&self, node: NodeId) -> NodeId {
        if self.n1 == node { self.n2 } else { self.n1 }
    }
}

#[derive(Clone, Debug)]
pub struct StTree {
    pub deg: usize,
    pub nodes: Vec<TreeNode>,
    pub edges: Vec<TreeEdge>,
}

impl StTree {
    pub fn empty() -> Self {
        Self {
            deg: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Flattens a branch list into nodes and edges, checking that it is one tree with
    /// `2 * deg - 2` nodes whose first `deg` entries sit on the pins.
    pub fn from_branches(net: &Net, branches: &[Branch]) -> Result<Self> {
        let deg = net.deg;
        if deg < 2 {
            return Ok(Self::empty());
        }
        let invalid = |msg: String| RouteError::InvalidNet {
            net: net.name.clone(),
            msg,
        };

        let num_nodes = 2 * deg - 2;
        if branches.len() != num_nodes {
            return Err(invalid(format!(
                "topology has {} nodes, expected {}",
                branches.len(),
                num_nodes
            )));
        }
        for (i, b) in branches.iter().take(deg).enumerate() {
            if b.x != net.pin_x[i] || b.y != net.pin_y[i] {
                return Err(invalid(format!("topology node {} is not on pin {}", i, i)));
            }
        }
        if branches.iter().any(|b| b.n >= num_nodes) {
            return Err(invalid("topology neighbour out of range".to_string()));
        }
        let roots = branches
            .iter()
            .enumerate()
            .filter(|(i, b)| b.n == *i)
            .count();
        if roots != 1 {
            return Err(invalid(format!("topology has {} roots", roots)));
        }
        // Every walk toward the root must end within `num_nodes` steps.
        for start in 0..num_nodes {
            let mut cur = start;
            let mut steps = 0;
            while branches[cur].n != cur {
                cur = branches[cur].n;
                steps += 1;
                if steps > num_nodes {
                    return Err(invalid("topology contains a cycle".to_string()));
                }
            }
        }

        let mut nodes: Vec<TreeNode> = branches
            .iter()
            .map(|b| TreeNode {
                x: b.x,
                y: b.y,
                edges: Vec::with_capacity(3),
            })
            .collect();
        let mut edges = Vec::with_capacity(2 * deg - 3);
        for (i, b) in branches.iter().enumerate() {
            if b.n == i {
                continue;
            }
            let eid = EdgeId::new(edges.len());
            let p = &branches[b.n];
            edges.push(TreeEdge {
                n1: NodeId::new(i),
                n2: NodeId::new(b.n),
                len: b.x.abs_diff(p.x) + b.y.abs_diff(p.y),
                route: Vec::new(),
            });
            nodes[i].edges.push(eid);
            nodes[b.n].edges.push(eid);
        }
        debug_assert_eq!(edges.len(), 2 * deg - 3);

        Ok(Self { deg, nodes, edges })
    }

    #[inline(always)]
    pub fn pos(&self, node: NodeId) -> GridCoord {
        let n = &self.nodes[node.index()];
        GridCoord::planar(n.x, n.y)
    }

    pub fn is_steiner(&self, node: NodeId) -> bool {
        node.index() >= self.deg
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + use<> {
        (0..self.edges.len()).map(EdgeId::new)
    }

    /// Total routed length.
    pub fn wirelength(&self) -> u64 {
        self.edges.iter().map(|e| e.len as u64).sum()
    }

    /// The route of `e` oriented to start at `from`.
    pub fn route_from(&self, e: EdgeId, from: NodeId) -> Vec<GridCoord> {
        let edge = &self.edges[e.index()];
        let mut route = edge.route.clone();
        if edge.n1 != from {
            route.reverse();
        }
        route
    }

    /// Replaces the route of `e`, oriented from `n1` to `n2`, and updates its length.
    pub fn set_route(&mut self, e: EdgeId, route: Vec<GridCoord>) {
        let edge = &mut self.edges[e.index()];
        edge.len = route.len().saturating_sub(1) as u32;
        edge.route = route;
    }

    /// Nodes and edges reachable from `start` without crossing `cut`.
    pub fn component(&self, start: NodeId, cut: EdgeId) -> (Vec<NodeId>, Vec<EdgeId>) {
        self.walk(start, Some(cut))
    }

    fn walk(&self, start: NodeId, cut: Option<EdgeId>) -> (Vec<NodeId>, Vec<EdgeId>) {
        let mut seen = vec![false; self.nodes.len()];
        let mut nodes = vec![start];
        let mut edges = Vec::new();
        let mut queue = VecDeque::from([start]);
        seen[start.index()] = true;
        while let Some(u) = queue.pop_front() {
            for &e in &self.nodes[u.index()].edges {
                if Some(e) == cut {
                    continue;
                }
                let v = self.edges[e.index()].other(u);
                if !seen[v.index()] {
                    seen[v.index()] = true;
                    edges.push(e);
                    nodes.push(v);
                    queue.push_back(v);
                }
            }
        }
        (nodes, edges)
    }

    /// Whether `relocate_steiner(node, cut, target)` would succeed.
    pub fn can_relocate(&self, node: NodeId, cut: EdgeId, target: GridCoord) -> bool {
        self.other_edges(node, cut).is_some()
            && self
                .component(node, cut)
                .1
                .iter()
                .any(|e| self.edges[e.index()].route.iter().any(|c| c.same_xy(&target)))
    }

    /// The two routed edges of a degree-three Steiner node besides `cut`.
    fn other_edges(&self, node: NodeId, cut: EdgeId) -> Option<(EdgeId, EdgeId)> {
        if !self.is_steiner(node) {
            return None;
        }
        let list = &self.nodes[node.index()].edges;
        if list.len() != 3 || !list.contains(&cut) {
            return None;
        }
        let mut others = list.iter().copied().filter(|&e| e != cut);
        let (ea, eb) = (others.next()?, others.next()?);
        if self.edges[ea.index()].is_routed() && self.edges[eb.index()].is_routed() {
            Some((ea, eb))
        } else {
            None
        }
    }

    /// Moves Steiner node `node` (degree three, one edge being `cut`) onto `target`, a
    /// cell of some route in its component. Its two other edges are fused into one, and
    /// the route through `target` is split there to re-attach the node. Every routed cell
    /// is kept, so edge usage does not change.
    ///
    /// Returns false and leaves the tree untouched if the move is not possible.
    pub fn relocate_steiner(&mut self, node: NodeId, cut: EdgeId, target: GridCoord) -> bool {
        if self.pos(node).same_xy(&target) || !self.can_relocate(node, cut, target) {
            return false;
        }
        let Some((ea, eb)) = self.other_edges(node, cut) else {
            return false;
        };
        let a3 = self.edges[ea.index()].other(node);
        let a4 = self.edges[eb.index()].other(node);

        // Fuse a3 - node - a4 into ea.
        let mut fused = self.route_from(ea, a3);
        let tail = self.route_from(eb, node);
        fused.extend(tail.into_iter().skip(1));

        let (_, comp) = self.component(node, cut);
        let host = comp
            .into_iter()
            .filter(|&e| e != ea && e != eb)
            .find_map(|e| {
                let route = &self.edges[e.index()].route;
                route.iter().position(|c| c.same_xy(&target)).map(|k| (e, k))
            })
            .or_else(|| {
                fused
                    .iter()
                    .position(|c| c.same_xy(&target))
                    .map(|k| (ea, k))
            });
        let Some((host, k)) = host else {
            return false;
        };

        self.edges[ea.index()].n1 = a3;
        self.edges[ea.index()].n2 = a4;
        self.set_route(ea, fused);
        replace_edge(&mut self.nodes[a4.index()].edges, eb, ea);
        self.nodes[node.index()].edges.retain(|&e| e == cut);

        // Split the host at `k`: the host keeps its first half, eb takes the second.
        let route = std::mem::take(&mut self.edges[host.index()].route);
        let h2 = self.edges[host.index()].n2;
        let first = route[..=k].to_vec();
        let second = route[k..].to_vec();

        self.edges[host.index()].n2 = node;
        self.set_route(host, first);
        self.edges[eb.index()].n1 = node;
        self.edges[eb.index()].n2 = h2;
        self.set_route(eb, second);

        replace_edge(&mut self.nodes[h2.index()].edges, host, eb);
        self.nodes[node.index()].edges.push(host);
        self.nodes[node.index()].edges.push(eb);

        self.nodes[node.index()].x = target.x;
        self.nodes[node.index()].y = target.y;
        true
    }

    /// Every pin is reachable from pin 0 and each routed edge runs between its ends in
    /// unit steps.
    pub fn is_consistent(&self) -> bool {
        if self.deg < 2 {
            return true;
        }
        let (reached, _) = self.walk(NodeId::new(0), None);
        if reached.len() != self.nodes.len() {
            return false;
        }
        self.edges.iter().all(|e| {
            if !e.is_routed() {
                return true;
            }
            let a = self.pos(e.n1);
            let b = self.pos(e.n2);
            e.route[0].same_xy(&a)
                && e.route[e.route.len() - 1].same_xy(&b)
                && e.route.windows(2).all(|w| w[0].is_adjacent(&w[1]))
        })
    }
}

fn replace_edge(list: &mut [EdgeId], from: EdgeId, to: EdgeId) {
    if let Some(slot) = list.iter_mut().find(|e| **e == from) {
        *slot = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::LayerSpan;
    use grt_common::db::indices::NetId;

    fn net_of(pins: &[(u32, u32)]) -> Net {
        Net {
            id: NetId::new(0),
            name: "t".to_string(),
            ext_id: 0,
            num_pins: pins.len(),
            deg: pins.len(),
            pin_x: pins.iter().map(|p| p.0).collect(),
            pin_y: pins.iter().map(|p| p.1).collect(),
            pin_l: vec![LayerSpan::single(0); pins.len()],
            alpha: 0.0,
        }
    }

    fn straight(a: (u32, u32), b: (u32, u32)) -> Vec<GridCoord> {
        // horizontal first, then vertical
        let mut cells = vec![GridCoord::planar(a.0, a.1)];
        let (mut x, mut y) = a;
        while x != b.0 {
            x = if b.0 > x { x + 1 } else { x - 1 };
            cells.push(GridCoord::planar(x, y));
        }
        while y != b.1 {
            y = if b.1 > y { y + 1 } else { y - 1 };
            cells.push(GridCoord::planar(x, y));
        }
        cells
    }

    fn three_pin_tree() -> StTree {
        // pins (0,0) (6,0) (3,4); Steiner at (3,0) rooted at pin 0
        let net = net_of(&[(0, 0), (6, 0), (3, 4)]);
        let branches = [
            Branch { x: 0, y: 0, n: 0 },
            Branch { x: 6, y: 0, n: 3 },
            Branch { x: 3, y: 4, n: 3 },
            Branch { x: 3, y: 0, n: 0 },
        ];
        let mut tree = StTree::from_branches(&net, &branches).unwrap();
        for e in tree.edge_ids().collect::<Vec<_>>() {
            let edge = &tree.edges[e.index()];
            let a = tree.pos(edge.n1);
            let b = tree.pos(edge.n2);
            tree.set_route(e, straight((a.x, a.y), (b.x, b.y)));
        }
        tree
    }

    #[test]
    fn binary_tree_edge_count() {
        let tree = three_pin_tree();
        assert_eq!(tree.nodes.len(), 4);
        assert_eq!(tree.edges.len(), 3);
        assert!(tree.is_consistent());
        assert_eq!(tree.wirelength(), 3 + 3 + 4);
    }

    #[test]
    fn cycles_and_extra_roots_are_rejected() {
        let net = net_of(&[(0, 0), (2, 0), (1, 1)]);
        let cyclic = [
            Branch { x: 0, y: 0, n: 0 },
            Branch { x: 2, y: 0, n: 3 },
            Branch { x: 1, y: 1, n: 3 },
            Branch { x: 1, y: 0, n: 2 },
        ];
        assert!(StTree::from_branches(&net, &cyclic).is_err());

        let short = [Branch { x: 0, y: 0, n: 0 }, Branch { x: 2, y: 0, n: 0 }];
        assert!(StTree::from_branches(&net, &short).is_err());
    }

    #[test]
    fn component_stops_at_cut() {
        let tree = three_pin_tree();
        let steiner = NodeId::new(3);
        let cut = tree.nodes[2].edges[0];
        let (nodes, edges) = tree.component(steiner, cut);
        assert_eq!(nodes.len(), 3);
        assert_eq!(edges.len(), 2);
        assert!(!edges.contains(&cut));
    }

    #[test]
    fn relocation_keeps_cells_and_connectivity() {
        let mut tree = three_pin_tree();
        let steiner = NodeId::new(3);
        let cut = tree.nodes[2].edges[0];
        let before: usize = tree.edges.iter().map(|e| e.len as usize).sum();

        assert!(tree.relocate_steiner(steiner, cut, GridCoord::planar(1, 0)));
        assert_eq!(tree.pos(steiner), GridCoord::planar(1, 0));
        assert_eq!(tree.nodes[steiner.index()].edges.len(), 3);

        // The cut edge is stale until rerouted; everything else still joins up.
        let after: usize = tree
            .edges
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != cut.index())
            .map(|(_, e)| e.len as usize)
            .sum();
        let cut_len = tree.edges[cut.index()].len as usize;
        assert_eq!(after + cut_len, before);
        tree.set_route(cut, straight((3, 4), (1, 0)));
        let e = &tree.edges[cut.index()];
        if e.n1 != NodeId::new(2) {
            let r: Vec<_> = e.route.iter().rev().copied().collect();
            tree.set_route(cut, r);
        }
        assert!(tree.is_consistent());
    }

    #[test]
    fn relocation_to_a_foreign_cell_is_refused() {
        let mut tree = three_pin_tree();
        let cut = tree.nodes[2].edges[0];
        assert!(!tree.relocate_steiner(NodeId::new(3), cut, GridCoord::planar(5, 5)));
        assert!(tree.is_consistent());
        assert_eq!(tree.pos(NodeId::new(3)), GridCoord::planar(3, 0));
    }
}
