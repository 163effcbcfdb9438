//! Pattern routes for the two-pin pieces of a tree: L, Z and monotonic staircase.
//! Every path here is monotone in x and y, so its length is the Manhattan distance of
//! its ends.

use crate::grid::{Edge, EdgeModel};
use grt_common::geom::coord::GridCoord;

/// Walks the corners in order, emitting every cell once.
pub fn polyline(corners: &[(u32, u32)]) -> Vec<GridCoord> {
    let Some(&(x0, y0)) = corners.first() else {
        return Vec::new();
    };
    let mut cells = vec![GridCoord::planar(x0, y0)];
    let (mut x, mut y) = (x0, y0);
    for &(tx, ty) in &corners[1..] {
        while x != tx {
            x = if tx > x { x + 1 } else { x - 1 };
            cells.push(GridCoord::planar(x, y));
        }
        while y != ty {
            y = if ty > y { y + 1 } else { y - 1 };
            cells.push(GridCoord::planar(x, y));
        }
    }
    cells
}

pub fn l_path(a: (u32, u32), b: (u32, u32), horizontal_first: bool) -> Vec<GridCoord> {
    let corner = if horizontal_first { (b.0, a.1) } else { (a.0, b.1) };
    polyline(&[a, corner, b])
}

/// Horizontal-vertical-horizontal with the vertical leg in column `mid`, or
/// vertical-horizontal-vertical with the horizontal leg in row `mid`.
pub fn z_path(a: (u32, u32), b: (u32, u32), mid: u32, hvh: bool) -> Vec<GridCoord> {
    if hvh {
        polyline(&[a, (mid, a.1), (mid, b.1), b])
    } else {
        polyline(&[a, (a.0, mid), (b.0, mid), b])
    }
}

/// Lexicographic path quality: fewer full edges first, then lower summed utilisation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathScore {
    pub full_edges: u32,
    pub cost: f32,
}

impl PathScore {
    pub fn better_than(&self, other: &PathScore) -> bool {
        self.full_edges < other.full_edges
            || (self.full_edges == other.full_edges && self.cost < other.cost)
    }
}

/// Scores a path against `demand` (usage or estimate) plus the track this path adds.
pub fn score_path(
    edges: &EdgeModel,
    path: &[GridCoord],
    demand: impl Fn(&Edge) -> f32,
) -> PathScore {
    let mut score = PathScore {
        full_edges: 0,
        cost: 0.0,
    };
    for w in path.windows(2) {
        let Some((dir, idx)) = edges.edge_between(w[0], w[1]) else {
            continue;
        };
        let e = edges.edge(dir, idx);
        let d = demand(e) + 1.0;
        if d > e.cap as f32 {
            score.full_edges += 1;
        }
        score.cost += d / (e.cap.max(1) as f32);
    }
    score
}

fn add_est_path(edges: &mut EdgeModel, path: &[GridCoord], delta: f32) {
    for w in path.windows(2) {
        edges.add_est_usage(w[0], w[1], delta);
    }
}

/// Probabilistic demand of an undecided piece: a straight piece is certain, a bent one
/// puts half a track on each of its two L shapes. `sign` adds or removes the estimate.
pub fn spread_estimate(edges: &mut EdgeModel, a: (u32, u32), b: (u32, u32), sign: f32) {
    if a.0 == b.0 || a.1 == b.1 {
        add_est_path(edges, &polyline(&[a, b]), sign);
    } else {
        add_est_path(edges, &l_path(a, b, true), 0.5 * sign);
        add_est_path(edges, &l_path(a, b, false), 0.5 * sign);
    }
}

/// Replaces the probabilistic estimate of a piece by one committed L, chosen on the
/// estimate of everything else.
pub fn commit_l(edges: &mut EdgeModel, a: (u32, u32), b: (u32, u32)) -> Vec<GridCoord> {
    spread_estimate(edges, a, b, -1.0);
    let path = if a.0 == b.0 || a.1 == b.1 {
        polyline(&[a, b])
    } else {
        let hv = l_path(a, b, true);
        let vh = l_path(a, b, false);
        let s_hv = score_path(edges, &hv, |e| e.est_usage);
        let s_vh = score_path(edges, &vh, |e| e.est_usage);
        if s_vh.better_than(&s_hv) { vh } else { hv }
    };
    add_est_path(edges, &path, 1.0);
    path
}

/// Best L or Z shape for a piece whose own usage is already removed.
pub fn best_z(edges: &EdgeModel, a: (u32, u32), b: (u32, u32)) -> Vec<GridCoord> {
    if a.0 == b.0 || a.1 == b.1 {
        return polyline(&[a, b]);
    }
    let usage = |e: &Edge| e.usage as f32;
    let mut best = l_path(a, b, true);
    let mut best_score = score_path(edges, &best, usage);

    let (x_lo, x_hi) = (a.0.min(b.0), a.0.max(b.0));
    let (y_lo, y_hi) = (a.1.min(b.1), a.1.max(b.1));
    let candidates = (x_lo..=x_hi)
        .map(|m| (m, true))
        .chain((y_lo..=y_hi).map(|m| (m, false)));
    for (mid, hvh) in candidates {
        let path = z_path(a, b, mid, hvh);
        let score = score_path(edges, &path, usage);
        if score.better_than(&best_score) {
            best = path;
            best_score = score;
        }
    }
    best
}

/// Cheapest staircase from `a` to `b` inside their bounding box, by dynamic programming
/// over the box. Full edges cost heavily per unit of excess.
pub fn monotonic(edges: &EdgeModel, a: (u32, u32), b: (u32, u32)) -> Vec<GridCoord> {
    if a.0 == b.0 || a.1 == b.1 {
        return polyline(&[a, b]);
    }
    let w = (a.0.abs_diff(b.0) + 1) as usize;
    let h = (a.1.abs_diff(b.1) + 1) as usize;
    let at = |i: usize, j: usize| {
        let x = if b.0 > a.0 { a.0 + i as u32 } else { a.0 - i as u32 };
        let y = if b.1 > a.1 { a.1 + j as u32 } else { a.1 - j as u32 };
        GridCoord::planar(x, y)
    };
    let step_cost = |p: GridCoord, q: GridCoord| -> f32 {
        match edges.edge_between(p, q) {
            Some((dir, idx)) => {
                let e = edges.edge(dir, idx);
                let d = e.usage as f32 + 1.0;
                let excess = (d - e.cap as f32).max(0.0);
                1.0 + d / e.cap.max(1) as f32 + 10.0 * excess
            }
            None => f32::INFINITY,
        }
    };

    // cost[j * w + i], from_x marks an arrival along x
    let mut cost = vec![f32::INFINITY; w * h];
    let mut from_x = vec![false; w * h];
    cost[0] = 0.0;
    for j in 0..h {
        for i in 0..w {
            if i == 0 && j == 0 {
                continue;
            }
            let here = at(i, j);
            let mut best = f32::INFINITY;
            let mut via_x = false;
            if i > 0 {
                let c = cost[j * w + i - 1] + step_cost(at(i - 1, j), here);
                if c < best {
                    best = c;
                    via_x = true;
                }
            }
            if j > 0 {
                let c = cost[(j - 1) * w + i] + step_cost(at(i, j - 1), here);
                if c < best {
                    best = c;
                    via_x = false;
                }
            }
            cost[j * w + i] = best;
            from_x[j * w + i] = via_x;
        }
    }

    let mut path = Vec::with_capacity(w + h - 1);
    let (mut i, mut j) = (w - 1, h - 1);
    path.push(at(i, j));
    while i > 0 || j > 0 {
        if j == 0 || (i > 0 && from_x[j * w + i]) {
            i -= 1;
        } else {
            j -= 1;
        }
        path.push(at(i, j));
    }
    path.reverse();
    path
}
