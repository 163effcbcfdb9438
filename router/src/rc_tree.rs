//! Per-net tree over the final 3D segments, used to repair wires that run longer than
//! their layer allows.

use crate::grid::EdgeModel;
use crate::net::Net;
use grt_common::db::core::{GridSpec, LayerDirection, RouteSegment};
use grt_common::geom::coord::GridCoord;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Sink,
    Steiner,
}

#[derive(Clone, Debug)]
pub struct RcNode {
    pub pos: GridCoord,
    pub kind: NodeKind,
    /// Towards the source; `None` for the source and for unreachable nodes.
    pub parent: Option<usize>,
}

/// Nodes are segment endpoints; `branches[i]` joins the two endpoint nodes of segment `i`.
#[derive(Clone, Debug)]
pub struct SteinerTree {
    pub nodes: Vec<RcNode>,
    pub branches: Vec<(usize, usize)>,
    pub segments: Vec<RouteSegment>,
    /// Segment indices in breadth-first order from the source.
    pub order: Vec<usize>,
}

impl SteinerTree {
    /// Builds the tree from a net's segments. The first pin is the source.
    pub fn build(net: &Net, segments: Vec<RouteSegment>) -> Self {
        let mut index: HashMap<GridCoord, usize> = HashMap::new();
        let mut nodes: Vec<RcNode> = Vec::new();
        let mut node_at = |c: GridCoord, nodes: &mut Vec<RcNode>| {
            *index.entry(c).or_insert_with(|| {
                nodes.push(RcNode {
                    pos: c,
                    kind: NodeKind::Steiner,
                    parent: None,
                });
                nodes.len() - 1
            })
        };

        let branches: Vec<(usize, usize)> = segments
            .iter()
            .map(|s| (node_at(s.start(), &mut nodes), node_at(s.end(), &mut nodes)))
            .collect();

        for node in nodes.iter_mut() {
            let p = node.pos;
            if let Some(i) = (0..net.deg).find(|&i| {
                net.pin_x[i] == p.x && net.pin_y[i] == p.y && net.pin_l[i].distance(p.z) == 0
            }) {
                node.kind = if i == 0 {
                    NodeKind::Source
                } else {
                    NodeKind::Sink
                };
            }
        }

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, &(a, b)) in branches.iter().enumerate() {
            adjacency[a].push(i);
            adjacency[b].push(i);
        }

        let mut order = Vec::with_capacity(segments.len());
        let mut seen_seg = vec![false; segments.len()];
        let mut seen_node = vec![false; nodes.len()];
        let root = nodes.iter().position(|n| n.kind == NodeKind::Source);
        let starts: Vec<usize> = root.into_iter().chain(0..nodes.len()).collect();
        for start in starts {
            if seen_node[start] {
                continue;
            }
            seen_node[start] = true;
            let mut queue = VecDeque::from([start]);
            while let Some(u) = queue.pop_front() {
                for &s in &adjacency[u] {
                    if seen_seg[s] {
                        continue;
                    }
                    seen_seg[s] = true;
                    order.push(s);
                    let (a, b) = branches[s];
                    let v = if a == u { b } else { a };
                    if !seen_node[v] {
                        seen_node[v] = true;
                        nodes[v].parent = Some(u);
                        queue.push_back(v);
                    }
                }
            }
        }

        Self {
            nodes,
            branches,
            segments,
            order,
        }
    }

    /// Segment `i` running from the end nearer the source to the far end.
    pub fn downstream(&self, i: usize) -> RouteSegment {
        let seg = self.segments[i];
        let (a, b) = self.branches[i];
        if self.nodes[a].parent == Some(b) {
            RouteSegment::new(seg.end(), seg.start())
        } else {
            seg
        }
    }
}

/// Walks the tree from the source and moves wires longer than `max_len[layer]`
/// (0 = unlimited) to the nearest layer of the same direction that accepts their length
/// and still has a free track along the whole wire, adding vias at both ends. Every
/// returned segment points away from the source. Returns the rewritten segments and the
/// number of wires moved.
pub fn repair_long_segments(
    tree: &SteinerTree,
    grid: &GridSpec,
    max_len: &[u32],
    edges: &mut EdgeModel,
) -> (Vec<RouteSegment>, usize) {
    let limit = |l: u8| max_len.get(l as usize).copied().unwrap_or(0);
    let mut out = Vec::with_capacity(tree.segments.len());
    let mut moved = 0;

    for &i in &tree.order {
        let seg = tree.downstream(i);
        let len = seg.length();
        let layer = seg.init_layer;
        if seg.is_via() || limit(layer) == 0 || len <= limit(layer) {
            out.push(seg);
            continue;
        }
        let horizontal = seg.init_y == seg.final_y;
        let cells = seg.cells();
        let fits = |l: u8, edges: &EdgeModel| {
            let dir_ok = match grid.layers[l as usize].direction {
                LayerDirection::Horizontal => horizontal,
                LayerDirection::Vertical => !horizontal,
                LayerDirection::Unknown => true,
            };
            dir_ok
                && (limit(l) == 0 || len <= limit(l))
                && cells.windows(2).all(|w| {
                    let a = GridCoord::new(w[0].x, w[0].y, l);
                    let b = GridCoord::new(w[1].x, w[1].y, l);
                    edges.get_edge_current_resource(a, b).is_some_and(|r| r >= 1)
                })
        };

        let num_layers = grid.num_layers() as i32;
        let target = (1..num_layers)
            .flat_map(|d| [layer as i32 - d, layer as i32 + d])
            .filter(|&l| l >= 0 && l < num_layers)
            .map(|l| l as u8)
            .find(|&l| fits(l, edges));

        let Some(target) = target else {
            log::debug!(
                "No layer accepts a {}-tile wire at ({},{},{})",
                len,
                seg.init_x,
                seg.init_y,
                layer
            );
            out.push(seg);
            continue;
        };

        for w in cells.windows(2) {
            edges.add_usage_3d(w[0], w[1], -1);
            let a = GridCoord::new(w[0].x, w[0].y, target);
            let b = GridCoord::new(w[1].x, w[1].y, target);
            edges.add_usage_3d(a, b, 1);
        }
        let start = seg.start();
        let end = seg.end();
        let start_up = GridCoord::new(start.x, start.y, target);
        let end_up = GridCoord::new(end.x, end.y, target);
        out.push(RouteSegment::new(start, start_up));
        out.push(RouteSegment::new(start_up, end_up));
        out.push(RouteSegment::new(end_up, end));
        moved += 1;
    }
    (out, moved)
}
