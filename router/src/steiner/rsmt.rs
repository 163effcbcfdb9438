use super::{Branch, TopologyGenerator, TopologyRequest};
use grt_common::error::Result;
use std::collections::VecDeque;

/// Rectilinear minimum spanning tree, split into a full binary topology (pins as
/// leaves, degree-3 Steiner points) and refined by moving each Steiner point to the
/// coordinate-wise median of its neighbours.
pub struct RectilinearSteiner {
    pub refine_passes: usize,
}

impl Default for RectilinearSteiner {
    fn default() -> Self {
        Self { refine_passes: 8 }
    }
}

impl TopologyGenerator for RectilinearSteiner {
    fn generate(&self, req: &TopologyRequest<'_>) -> Result<Vec<Branch>> {
        let pins = req.pins;
        let deg = pins.len();
        match deg {
            0 => return Ok(Vec::new()),
            1 => {
                return Ok(vec![Branch {
                    x: pins[0].0,
                    y: pins[0].1,
                    n: 0,
                }]);
            }
            2 => {
                return Ok(vec![
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
                ]);
            }
            _ => {}
        }

        let coords: Vec<(f32, f32)> = pins
            .iter()
            .map(|&(x, y)| match req.congestion {
                Some(map) => map.warp(x, y),
                None => (x as f32, y as f32),
            })
            .collect();

        let root = if req.reroute {
            let mut order: Vec<usize> = (0..deg).collect();
            order.sort_by_key(|&i| (pins[i].0, pins[i].1));
            order[deg / 2]
        } else {
            0
        };

        let mst = prim(&coords, root);
        let (mut pos, adj) = binarize(pins, &mst);
        self.refine(&mut pos, &adj, deg);
        Ok(to_branches(&pos, &adj))
    }
}

impl RectilinearSteiner {
    fn refine(&self, pos: &mut [(u32, u32)], adj: &[Vec<usize>], deg: usize) {
        for _ in 0..self.refine_passes {
            let mut changed = false;
            for s in deg..pos.len() {
                let nb = &adj[s];
                let mut xs: Vec<u32> = nb.iter().map(|&n| pos[n].0).collect();
                let mut ys: Vec<u32> = nb.iter().map(|&n| pos[n].1).collect();
                xs.sort_unstable();
                ys.sort_unstable();
                let target = (xs[xs.len() / 2], ys[ys.len() / 2]);
                if target != pos[s] {
                    pos[s] = target;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

/// O(n^2) Prim; returns the neighbour lists of the spanning tree.
fn prim(coords: &[(f32, f32)], root: usize) -> Vec<Vec<usize>> {
    let n = coords.len();
    let dist = |a: usize, b: usize| {
        (coords[a].0 - coords[b].0).abs() + (coords[a].1 - coords[b].1).abs()
    };

    let mut in_tree = vec![false; n];
    let mut best = vec![f32::INFINITY; n];
    let mut link = vec![root; n];
    let mut adj = vec![Vec::new(); n];

    in_tree[root] = true;
    for i in 0..n {
        if i != root {
            best[i] = dist(root, i);
        }
    }

    for _ in 1..n {
        let mut next = usize::MAX;
        for i in 0..n {
            if !in_tree[i] && (next == usize::MAX || best[i] < best[next]) {
                next = i;
            }
        }
        in_tree[next] = true;
        adj[next].push(link[next]);
        adj[link[next]].push(next);
        for i in 0..n {
            if !in_tree[i] {
                let d = dist(next, i);
                if d < best[i] {
                    best[i] = d;
                    link[i] = next;
                }
            }
        }
    }
    adj
}

/// Rewrites a spanning tree on the pins into a topology whose pins are leaves and whose
/// `deg - 2` Steiner points (initially on top of their pin) all have degree three.
fn binarize(pins: &[(u32, u32)], mst: &[Vec<usize>]) -> (Vec<(u32, u32)>, Vec<Vec<usize>>) {
    let deg = pins.len();
    let mut pos: Vec<(u32, u32)> = pins.to_vec();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); deg];
    // attach[p][j]: node that carries pin p's j-th spanning-tree neighbour
    let mut attach: Vec<Vec<usize>> = vec![Vec::new(); deg];

    let link = |adj: &mut Vec<Vec<usize>>, a: usize, b: usize| {
        adj[a].push(b);
        adj[b].push(a);
    };

    for p in 0..deg {
        let d = mst[p].len();
        if d == 1 {
            attach[p].push(p);
            continue;
        }
        let first = pos.len();
        for _ in 0..d - 1 {
            pos.push(pins[p]);
            adj.push(Vec::new());
        }
        link(&mut adj, p, first);
        for k in 0..d - 2 {
            link(&mut adj, first + k, first + k + 1);
        }
        for j in 0..d {
            attach[p].push(first + j.min(d - 2));
        }
    }

    for p in 0..deg {
        for (j, &q) in mst[p].iter().enumerate() {
            if p < q {
                let jq = mst[q]
                    .iter()
                    .position(|&r| r == p)
                    .unwrap_or_default();
                link(&mut adj, attach[p][j], attach[q][jq]);
            }
        }
    }
    (pos, adj)
}

fn to_branches(pos: &[(u32, u32)], adj: &[Vec<usize>]) -> Vec<Branch> {
    let mut branches: Vec<Branch> = pos
        .iter()
        .map(|&(x, y)| Branch { x, y, n: usize::MAX })
        .collect();
    let mut queue = VecDeque::new();
    branches[0].n = 0;
    queue.push_back(0);
    while let Some(u) = queue.pop_front() {
        for &v in &adj[u] {
            if branches[v].n == usize::MAX {
                branches[v].n = u;
                queue.push_back(v);
            }
        }
    }
    branches
}
