//! Pluggable Steiner topology generation.
//!
//! A generator returns `2 * deg - 2` branches for `deg >= 2` distinct pins: the first `deg`
//! entries are the pins in input order, the rest are Steiner points. Each branch names
//! its neighbour toward the root in `n`; the root names itself.

pub mod rsmt;

pub use rsmt::RectilinearSteiner;

use crate::grid::{EdgeDir, EdgeModel};
use grt_common::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Branch {
    pub x: u32,
    pub y: u32,
    pub n: usize,
}

/// Per column/row crossing cost used to stretch coordinates in congestion-driven mode.
#[derive(Clone, Debug)]
pub struct CongestionMap {
    warp_x: Vec<f32>,
    warp_y: Vec<f32>,
}

impl CongestionMap {
    /// Stretches the gap between columns `i` and `i + 1` by `weight` times the mean
    /// estimated utilisation of the horizontal edges crossing it (rows likewise).
    pub fn from_edges(edges: &EdgeModel, weight: f32) -> Self {
        let xg = edges.x_grid;
        let yg = edges.y_grid;
        let ratio = |dir: EdgeDir, idx: usize| {
            let e = edges.edge(dir, idx);
            if e.cap == 0 {
                if e.est_usage > 0.0 { 4.0 } else { 0.0 }
            } else {
                (e.est_usage / e.cap as f32).min(4.0)
            }
        };

        let mut warp_x = Vec::with_capacity(xg as usize);
        let mut acc = 0.0f32;
        warp_x.push(acc);
        for x in 0..xg.saturating_sub(1) {
            let mean = (0..yg)
                .map(|y| ratio(EdgeDir::Horizontal, edges.h_index(x, y)))
                .sum::<f32>()
                / yg as f32;
            acc += 1.0 + weight * mean;
            warp_x.push(acc);
        }

        let mut warp_y = Vec::with_capacity(yg as usize);
        acc = 0.0;
        warp_y.push(acc);
        for y in 0..yg.saturating_sub(1) {
            let mean = (0..xg)
                .map(|x| ratio(EdgeDir::Vertical, edges.v_index(x, y)))
                .sum::<f32>()
                / xg as f32;
            acc += 1.0 + weight * mean;
            warp_y.push(acc);
        }

        Self { warp_x, warp_y }
    }

    #[inline(always)]
    pub fn warp(&self, x: u32, y: u32) -> (f32, f32) {
        (self.warp_x[x as usize], self.warp_y[y as usize])
    }
}

pub struct TopologyRequest<'a> {
    pub pins: &'a [(u32, u32)],
    /// Present in congestion-driven mode.
    pub congestion: Option<&'a CongestionMap>,
    /// Regenerating after overflow was observed; the generator may use a different seed.
    pub reroute: bool,
}

pub trait TopologyGenerator: Send + Sync {
    fn generate(&self, req: &TopologyRequest<'_>) -> Result<Vec<Branch>>;
}
