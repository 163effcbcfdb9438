//! Lifts converged planar trees onto the metal stack.
//!
//! Tree edges are visited breadth first from pin 0, so the layers at an edge's starting
//! node are always known. Each edge picks its layers by a shortest path over
//! (route cell, layer): wires stay on one layer and only on layers that allow the step's
//! direction, vias cost `via_cost` per layer crossed, and every track beyond a layer's
//! capacity costs `OVERFLOW_PENALTY`. Node layer spans become via stacks.

use crate::grid::EdgeModel;
use crate::net::{LayerSpan, Net};
use crate::tree::StTree;
use grt_common::db::core::{GridSpec, LayerDirection};
use grt_common::db::indices::NodeId;
use grt_common::geom::coord::GridCoord;
use std::collections::VecDeque;

const OVERFLOW_PENALTY: f64 = 1000.0;

/// 3D shape of one net: a layered path per routed tree edge plus the via stack at each
/// node whose span covers more than one layer.
#[derive(Clone, Debug, Default)]
pub struct NetLayout {
    pub paths: Vec<Vec<GridCoord>>,
    pub stacks: Vec<(u32, u32, LayerSpan)>,
}

pub struct LayerAssigner {
    directions: Vec<LayerDirection>,
    via_cost: f64,
}

impl LayerAssigner {
    pub fn new(grid: &GridSpec, via_cost: f64) -> Self {
        Self {
            directions: grid.layers.iter().map(|l| l.direction).collect(),
            via_cost,
        }
    }

    fn num_layers(&self) -> usize {
        self.directions.len()
    }

    /// Layers a wire step from `a` to `b` may use.
    fn allowed(&self, a: GridCoord, b: GridCoord) -> Vec<bool> {
        let horizontal = a.y == b.y;
        let fits: Vec<bool> = self
            .directions
            .iter()
            .map(|d| match d {
                LayerDirection::Horizontal => horizontal,
                LayerDirection::Vertical => !horizontal,
                LayerDirection::Unknown => true,
            })
            .collect();
        if fits.iter().any(|&f| f) {
            fits
        } else {
            vec![true; fits.len()]
        }
    }

    /// Assigns every edge of `tree` and commits the per-layer usage.
    pub fn assign_net(&self, net: &Net, tree: &StTree, edges: &mut EdgeModel) -> NetLayout {
        if tree.deg < 2 {
            return NetLayout::default();
        }
        let mut spans: Vec<Option<LayerSpan>> = vec![None; tree.nodes.len()];
        for (i, span) in net.pin_l.iter().enumerate().take(tree.deg) {
            spans[i] = Some(*span);
        }

        let mut layout = NetLayout::default();
        let mut seen = vec![false; tree.nodes.len()];
        let mut queue = VecDeque::from([NodeId::new(0)]);
        seen[0] = true;

        while let Some(parent) = queue.pop_front() {
            for &e in &tree.nodes[parent.index()].edges {
                let child = tree.edges[e.index()].other(parent);
                if seen[child.index()] {
                    continue;
                }
                seen[child.index()] = true;
                queue.push_back(child);

                let from = spans[parent.index()].unwrap_or(LayerSpan::single(0));
                let route = tree.route_from(e, parent);
                if route.len() < 2 {
                    // Both ends share a cell: the child's stack must reach the parent's.
                    let merged = match spans[child.index()] {
                        Some(mut s) => {
                            s.include(from.bot);
                            s.include(from.top);
                            s
                        }
                        None => from,
                    };
                    spans[child.index()] = Some(merged);
                    continue;
                }

                let path = self.assign_path(&route, from, spans[child.index()], edges);
                for w in path.windows(2) {
                    if !w[0].same_xy(&w[1]) {
                        edges.add_usage_3d(w[0], w[1], 1);
                    }
                }
                if let (Some(first), Some(last)) = (path.first(), path.last()) {
                    if let Some(s) = spans[parent.index()].as_mut() {
                        s.include(first.z);
                    } else {
                        spans[parent.index()] = Some(LayerSpan::single(first.z));
                    }
                    match spans[child.index()].as_mut() {
                        Some(s) => s.include(last.z),
                        None => spans[child.index()] = Some(LayerSpan::single(last.z)),
                    }
                }
                layout.paths.push(path);
            }
        }

        for (i, span) in spans.iter().enumerate() {
            if let Some(span) = span {
                if span.bot < span.top {
                    let node = &tree.nodes[i];
                    layout.stacks.push((node.x, node.y, *span));
                }
            }
        }
        layout
    }

    /// Cheapest layering of one planar route, returned as 3D cells. Consecutive cells
    /// with the same x and y are a via.
    fn assign_path(
        &self,
        route: &[GridCoord],
        from: LayerSpan,
        to: Option<LayerSpan>,
        edges: &EdgeModel,
    ) -> Vec<GridCoord> {
        let layers = self.num_layers();
        let n = route.len();
        let mut cost = vec![f64::INFINITY; n * layers];
        // Layer each cell was entered on before any via at that cell.
        let mut origin = vec![0u8; n * layers];

        for l in 0..layers {
            cost[l] = self.via_cost * from.distance(l as u8) as f64;
        }

        for k in 0..n {
            let row = k * layers;
            for l in 0..layers {
                origin[row + l] = l as u8;
            }
            for l in 1..layers {
                let up = cost[row + l - 1] + self.via_cost;
                if up < cost[row + l] {
                    cost[row + l] = up;
                    origin[row + l] = origin[row + l - 1];
                }
            }
            for l in (0..layers.saturating_sub(1)).rev() {
                let down = cost[row + l + 1] + self.via_cost;
                if down < cost[row + l] {
                    cost[row + l] = down;
                    origin[row + l] = origin[row + l + 1];
                }
            }
            if k + 1 == n {
                break;
            }

            let (a, b) = (route[k], route[k + 1]);
            let allowed = self.allowed(a, b);
            let Some((dir, idx)) = edges.edge_between(a, b) else {
                continue;
            };
            let next = (k + 1) * layers;
            for l in 0..layers {
                if !allowed[l] || cost[row + l].is_infinite() {
                    continue;
                }
                let e = edges.edge_3d(dir, l, idx);
                let excess = (e.usage + 1).saturating_sub(e.cap);
                cost[next + l] = cost[row + l] + 1.0 + OVERFLOW_PENALTY * excess as f64;
            }
        }

        let last = (n - 1) * layers;
        let mut best = 0;
        let mut best_cost = f64::INFINITY;
        for l in 0..layers {
            let end = to.map_or(0.0, |s| self.via_cost * s.distance(l as u8) as f64);
            let c = cost[last + l] + end;
            if c < best_cost {
                best_cost = c;
                best = l;
            }
        }

        let mut path = Vec::with_capacity(n + 4);
        let mut layer = best;
        for k in (0..n).rev() {
            let c = route[k];
            path.push(GridCoord::new(c.x, c.y, layer as u8));
            let entered = origin[k * layers + layer] as usize;
            if entered != layer {
                path.push(GridCoord::new(c.x, c.y, entered as u8));
                layer = entered;
            }
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::EdgeDir;
    use crate::steiner::Branch;
    use crate::twopin::polyline;
    use grt_common::db::core::NetData;
    use grt_common::db::indices::{EdgeId, NetId};

    fn routed(grid: &GridSpec, pins: &[(u32, u32, u8)], corner: (u32, u32)) -> (Net, StTree) {
        let data = NetData {
            name: "n".to_string(),
            id: 0,
            pins: pins.iter().map(|&(x, y, z)| GridCoord::new(x, y, z)).collect(),
            alpha: 0.0,
        };
        let net = Net::from_data(NetId::new(0), &data, grid).unwrap();
        let branches = [
            Branch {
                x: pins[0].0,
                y: pins[0].1,
                n: 1,
            },
            Branch {
                x: pins[1].0,
                y: pins[1].1,
                n: 1,
            },
        ];
        let mut tree = StTree::from_branches(&net, &branches).unwrap();
        let route = polyline(&[(pins[0].0, pins[0].1), corner, (pins[1].0, pins[1].1)]);
        tree.set_route(EdgeId::new(0), route);
        (net, tree)
    }

    fn layer_sum(edges: &EdgeModel, dir: EdgeDir, idx: usize) -> u32 {
        edges.layered_usage(dir, idx)
    }

    #[test]
    fn wires_follow_preferred_directions() {
        // Layer 0 horizontal, layer 1 vertical.
        let grid = GridSpec::uniform(5, 5, 2, 2);
        let mut edges = EdgeModel::new(&grid);
        let (net, tree) = routed(&grid, &[(0, 0, 0), (3, 2, 0)], (3, 0));
        edges.add_route_usage(&tree.edges[0].route, 1);

        let assigner = LayerAssigner::new(&grid, 1.0);
        let layout = assigner.assign_net(&net, &tree, &mut edges);
        assert_eq!(layout.paths.len(), 1);
        for w in layout.paths[0].windows(2) {
            if w[0].same_xy(&w[1]) {
                continue;
            }
            assert_eq!(w[0].z, w[1].z);
            let horizontal = w[0].y == w[1].y;
            assert_eq!(w[0].z == 0, horizontal);
        }
        // Pin 1 sits on layer 0 but the last leg is vertical, so a via reaches it either
        // inside the path or as a stack on the pin.
        let path = &layout.paths[0];
        assert!(path.contains(&GridCoord::new(3, 2, 1)));
        let last = path[path.len() - 1];
        assert!(
            last.z == 0
                || layout
                    .stacks
                    .iter()
                    .any(|&(x, y, s)| (x, y) == (3, 2) && s.distance(0) == 0)
        );

        for (dir, idx) in edges.edge_ids().collect::<Vec<_>>() {
            assert_eq!(layer_sum(&edges, dir, idx), edges.edge(dir, idx).usage);
        }
    }

    #[test]
    fn full_layer_pushes_wire_up() {
        // Three layers: 0 and 2 horizontal, 1 vertical.
        let grid = GridSpec::uniform(4, 2, 3, 1);
        let mut edges = EdgeModel::new(&grid);
        edges.add_usage_3d(GridCoord::new(1, 0, 0), GridCoord::new(2, 0, 0), 1);
        let (net, tree) = routed(&grid, &[(0, 0, 0), (3, 0, 0)], (3, 0));

        let assigner = LayerAssigner::new(&grid, 1.0);
        let layout = assigner.assign_net(&net, &tree, &mut edges);
        let path = &layout.paths[0];
        let crossing = path
            .windows(2)
            .find(|w| w[0].x == 1 && w[1].x == 2)
            .map(|w| w[0].z);
        assert_eq!(crossing, Some(2));
        assert_eq!(edges.overflow_3d().total, 0);
    }

    #[test]
    fn single_layer_needs_no_vias() {
        let grid = GridSpec::uniform(4, 4, 1, 3);
        let mut edges = EdgeModel::new(&grid);
        let (net, tree) = routed(&grid, &[(0, 0, 0), (3, 3, 0)], (0, 3));
        let layout = LayerAssigner::new(&grid, 1.0).assign_net(&net, &tree, &mut edges);
        assert!(layout.stacks.is_empty());
        assert!(layout.paths[0].iter().all(|c| c.z == 0));
        assert_eq!(layout.paths[0].len(), 7);
    }
}
