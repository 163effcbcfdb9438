use grt_common::db::core::{CapacityAdjustment, GridSpec};
use grt_common::error::{Result, RouteError};
use grt_common::geom::coord::GridCoord;

/// Aggregate (all layers) state of one planar grid edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct Edge {
    pub cap: u32,
    pub usage: u32,
    /// Fractional demand used while the initial pattern routes are still undecided.
    pub est_usage: f32,
    /// Capacity removed from the nominal aggregate by adjustments.
    pub red: u32,
    /// Congestion history: accumulated overflow, decayed while the edge is healthy.
    pub last_usage: f32,
}

impl Edge {
    #[inline(always)]
    pub fn overflow(&self) -> u32 {
        self.usage.saturating_sub(self.cap)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Edge3D {
    pub cap: u32,
    pub usage: u32,
    pub red: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeDir {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverflowStats {
    pub total: u64,
    pub max: u32,
    pub overflowed_edges: usize,
    pub h_total: u64,
    pub v_total: u64,
    pub usage: u64,
}

/// Dense per-edge capacity/usage/history arrays, 2D aggregate and per layer.
///
/// Horizontal edge `(x, y)` joins `(x, y)`-`(x + 1, y)` and lives at `y * (x_grid - 1) + x`;
/// vertical edge `(x, y)` joins `(x, y)`-`(x, y + 1)` and lives at `y * x_grid + x`.
/// Per-layer arrays add `layer * plane_size` to the same index.
#[derive(Clone)]
pub struct EdgeModel {
    pub x_grid: u32,
    pub y_grid: u32,
    pub num_layers: usize,
    pub h_capacity_3d: Vec<u32>,
    pub v_capacity_3d: Vec<u32>,
    pub h_capacity: u32,
    pub v_capacity: u32,
    h_edges: Vec<Edge>,
    v_edges: Vec<Edge>,
    h_edges_3d: Vec<Edge3D>,
    v_edges_3d: Vec<Edge3D>,
}

impl EdgeModel {
    pub fn new(grid: &GridSpec) -> Self {
        let x_grid = grid.x_grids;
        let y_grid = grid.y_grids;
        let num_layers = grid.num_layers();
        let h_plane = (x_grid.saturating_sub(1) * y_grid) as usize;
        let v_plane = (x_grid * y_grid.saturating_sub(1)) as usize;

        let h_capacity_3d: Vec<u32> = grid.layers.iter().map(|l| l.h_capacity).collect();
        let v_capacity_3d: Vec<u32> = grid.layers.iter().map(|l| l.v_capacity).collect();
        let h_capacity: u32 = h_capacity_3d.iter().sum();
        let v_capacity: u32 = v_capacity_3d.iter().sum();

        if h_plane * num_layers + v_plane * num_layers > 500_000_000 {
            log::warn!(
                "Allocating large EdgeModel: {} per-layer edges. Ensure sufficient RAM.",
                (h_plane + v_plane) * num_layers
            );
        }

        let mut h_edges_3d = Vec::with_capacity(h_plane * num_layers);
        let mut v_edges_3d = Vec::with_capacity(v_plane * num_layers);
        for l in 0..num_layers {
            h_edges_3d.extend(std::iter::repeat_n(
                Edge3D {
                    cap: h_capacity_3d[l],
                    ..Default::default()
                },
                h_plane,
            ));
            v_edges_3d.extend(std::iter::repeat_n(
                Edge3D {
                    cap: v_capacity_3d[l],
                    ..Default::default()
                },
                v_plane,
            ));
        }

        Self {
            x_grid,
            y_grid,
            num_layers,
            h_edges: vec![
                Edge {
                    cap: h_capacity,
                    ..Default::default()
                };
                h_plane
            ],
            v_edges: vec![
                Edge {
                    cap: v_capacity,
                    ..Default::default()
                };
                v_plane
            ],
            h_capacity_3d,
            v_capacity_3d,
            h_capacity,
            v_capacity,
            h_edges_3d,
            v_edges_3d,
        }
    }

    #[inline(always)]
    pub fn h_index(&self, x: u32, y: u32) -> usize {
        (y * (self.x_grid - 1) + x) as usize
    }

    #[inline(always)]
    pub fn v_index(&self, x: u32, y: u32) -> usize {
        (y * self.x_grid + x) as usize
    }

    #[inline(always)]
    fn plane_size(&self, dir: EdgeDir) -> usize {
        match dir {
            EdgeDir::Horizontal => self.h_edges.len(),
            EdgeDir::Vertical => self.v_edges.len(),
        }
    }

    /// The planar edge joining two 4-adjacent cells, ignoring layers.
    #[inline]
    pub fn edge_between(&self, a: GridCoord, b: GridCoord) -> Option<(EdgeDir, usize)> {
        if a.y == b.y && a.x.abs_diff(b.x) == 1 && a.x.max(b.x) < self.x_grid && a.y < self.y_grid
        {
            return Some((EdgeDir::Horizontal, self.h_index(a.x.min(b.x), a.y)));
        }
        if a.x == b.x && a.y.abs_diff(b.y) == 1 && a.y.max(b.y) < self.y_grid && a.x < self.x_grid
        {
            return Some((EdgeDir::Vertical, self.v_index(a.x, a.y.min(b.y))));
        }
        None
    }

    #[inline(always)]
    pub fn edge(&self, dir: EdgeDir, idx: usize) -> &Edge {
        match dir {
            EdgeDir::Horizontal => &self.h_edges[idx],
            EdgeDir::Vertical => &self.v_edges[idx],
        }
    }

    #[inline(always)]
    pub fn edge_mut(&mut self, dir: EdgeDir, idx: usize) -> &mut Edge {
        match dir {
            EdgeDir::Horizontal => &mut self.h_edges[idx],
            EdgeDir::Vertical => &mut self.v_edges[idx],
        }
    }

    #[inline(always)]
    pub fn edge_3d(&self, dir: EdgeDir, layer: usize, idx: usize) -> &Edge3D {
        let offset = layer * self.plane_size(dir);
        match dir {
            EdgeDir::Horizontal => &self.h_edges_3d[offset + idx],
            EdgeDir::Vertical => &self.v_edges_3d[offset + idx],
        }
    }

    #[inline(always)]
    fn edge_3d_mut(&mut self, dir: EdgeDir, layer: usize, idx: usize) -> &mut Edge3D {
        let offset = layer * self.plane_size(dir);
        match dir {
            EdgeDir::Horizontal => &mut self.h_edges_3d[offset + idx],
            EdgeDir::Vertical => &mut self.v_edges_3d[offset + idx],
        }
    }

    pub fn h_edge(&self, x: u32, y: u32) -> &Edge {
        &self.h_edges[self.h_index(x, y)]
    }

    pub fn v_edge(&self, x: u32, y: u32) -> &Edge {
        &self.v_edges[self.v_index(x, y)]
    }

    /// Nominal aggregate capacity of a direction, before adjustments.
    #[inline(always)]
    pub fn nominal(&self, dir: EdgeDir) -> u32 {
        match dir {
            EdgeDir::Horizontal => self.h_capacity,
            EdgeDir::Vertical => self.v_capacity,
        }
    }

    pub fn layer_capacity(&self, dir: EdgeDir, layer: usize) -> u32 {
        match dir {
            EdgeDir::Horizontal => self.h_capacity_3d[layer],
            EdgeDir::Vertical => self.v_capacity_3d[layer],
        }
    }

    fn resolve_3d(&self, a: GridCoord, b: GridCoord) -> Option<(EdgeDir, usize, usize)> {
        if a.z != b.z || a.z as usize >= self.num_layers {
            return None;
        }
        self.edge_between(a, b)
            .map(|(dir, idx)| (dir, a.z as usize, idx))
    }

    /// Sets the capacity of one per-layer edge and moves the aggregate edge by the same
    /// delta. Negative capacities clamp to zero. Repeating a call changes nothing.
    pub fn add_adjustment(&mut self, adj: &CapacityAdjustment) -> Result<()> {
        let (dir, layer, idx) =
            self.resolve_3d(adj.from, adj.to)
                .ok_or(RouteError::AdjustmentOutOfRange {
                    x1: adj.from.x,
                    y1: adj.from.y,
                    l1: adj.from.z,
                    x2: adj.to.x,
                    y2: adj.to.y,
                    l2: adj.to.z,
                })?;

        let new_cap = if adj.new_capacity < 0 {
            log::warn!(
                "Capacity adjustment {:?}-{:?} to {} clamped to 0",
                adj.from,
                adj.to,
                adj.new_capacity
            );
            0
        } else {
            adj.new_capacity.min(u32::MAX as i64) as u32
        };

        let nominal = self.layer_capacity(dir, layer);
        let e3 = self.edge_3d_mut(dir, layer, idx);
        let delta = e3.cap as i64 - new_cap as i64;
        e3.cap = new_cap;
        e3.red = nominal.saturating_sub(new_cap);

        let e2 = self.edge_mut(dir, idx);
        e2.cap = (e2.cap as i64 - delta).max(0) as u32;
        e2.red = (e2.red as i64 + delta).max(0) as u32;
        Ok(())
    }

    /// Per-layer capacity of the edge between two adjacent cells of one layer.
    pub fn get_edge_capacity(&self, a: GridCoord, b: GridCoord) -> Option<u32> {
        self.resolve_3d(a, b)
            .map(|(dir, layer, idx)| self.edge_3d(dir, layer, idx).cap)
    }

    /// Remaining per-layer resource (capacity minus assigned usage); negative on overflow.
    pub fn get_edge_current_resource(&self, a: GridCoord, b: GridCoord) -> Option<i64> {
        self.resolve_3d(a, b).map(|(dir, layer, idx)| {
            let e = self.edge_3d(dir, layer, idx);
            e.cap as i64 - e.usage as i64
        })
    }

    /// Adds `delta` routed tracks to the planar edge between two adjacent cells.
    /// Removal never drives usage below zero.
    #[inline]
    pub fn add_usage(&mut self, a: GridCoord, b: GridCoord, delta: i32) {
        if let Some((dir, idx)) = self.edge_between(a, b) {
            let e = self.edge_mut(dir, idx);
            e.usage = apply_delta(e.usage, delta);
        }
    }

    pub fn add_est_usage(&mut self, a: GridCoord, b: GridCoord, delta: f32) {
        if let Some((dir, idx)) = self.edge_between(a, b) {
            let e = self.edge_mut(dir, idx);
            e.est_usage = (e.est_usage + delta).max(0.0);
        }
    }

    /// Applies `delta` along every step of a planar polyline. Layer changes are skipped.
    pub fn add_route_usage(&mut self, cells: &[GridCoord], delta: i32) {
        for w in cells.windows(2) {
            if !w[0].same_xy(&w[1]) {
                self.add_usage(w[0], w[1], delta);
            }
        }
    }

    pub fn add_usage_3d(&mut self, a: GridCoord, b: GridCoord, delta: i32) {
        if let Some((dir, layer, idx)) = self.resolve_3d(a, b) {
            let e = self.edge_3d_mut(dir, layer, idx);
            e.usage = apply_delta(e.usage, delta);
        }
    }

    pub fn clear_usage(&mut self) {
        for e in self.h_edges.iter_mut().chain(self.v_edges.iter_mut()) {
            e.usage = 0;
        }
    }

    pub fn clear_est_usage(&mut self) {
        for e in self.h_edges.iter_mut().chain(self.v_edges.iter_mut()) {
            e.est_usage = 0.0;
        }
    }

    /// Makes the estimate agree with the committed usage.
    pub fn sync_est_usage(&mut self) {
        for e in self.h_edges.iter_mut().chain(self.v_edges.iter_mut()) {
            e.est_usage = e.usage as f32;
        }
    }

    pub fn clear_usage_3d(&mut self) {
        for e in self.h_edges_3d.iter_mut().chain(self.v_edges_3d.iter_mut()) {
            e.usage = 0;
        }
    }

    pub fn overflow_2d(&self) -> OverflowStats {
        let mut stats = OverflowStats::default();
        for (dir, edges) in [
            (EdgeDir::Horizontal, &self.h_edges),
            (EdgeDir::Vertical, &self.v_edges),
        ] {
            for e in edges.iter() {
                let of = e.overflow();
                stats.usage += e.usage as u64;
                if of > 0 {
                    stats.total += of as u64;
                    stats.max = stats.max.max(of);
                    stats.overflowed_edges += 1;
                    match dir {
                        EdgeDir::Horizontal => stats.h_total += of as u64,
                        EdgeDir::Vertical => stats.v_total += of as u64,
                    }
                }
            }
        }
        stats
    }

    pub fn overflow_3d(&self) -> OverflowStats {
        let mut stats = OverflowStats::default();
        for (dir, edges) in [
            (EdgeDir::Horizontal, &self.h_edges_3d),
            (EdgeDir::Vertical, &self.v_edges_3d),
        ] {
            for e in edges.iter() {
                let of = e.usage.saturating_sub(e.cap);
                stats.usage += e.usage as u64;
                if of > 0 {
                    stats.total += of as u64;
                    stats.max = stats.max.max(of);
                    stats.overflowed_edges += 1;
                    match dir {
                        EdgeDir::Horizontal => stats.h_total += of as u64,
                        EdgeDir::Vertical => stats.v_total += of as u64,
                    }
                }
            }
        }
        stats
    }

    /// Sum over layers of per-layer usage, for the planar edge `(dir, idx)`.
    pub fn layered_usage(&self, dir: EdgeDir, idx: usize) -> u32 {
        (0..self.num_layers)
            .map(|l| self.edge_3d(dir, l, idx).usage)
            .sum()
    }

    /// Iterates `(dir, idx)` over every planar edge.
    pub fn edge_ids(&self) -> impl Iterator<Item = (EdgeDir, usize)> + '_ {
        (0..self.h_edges.len())
            .map(|i| (EdgeDir::Horizontal, i))
            .chain((0..self.v_edges.len()).map(|i| (EdgeDir::Vertical, i)))
    }

    /// Adds each edge's current overflow to its history. Healthy edges decay by
    /// `decay` unless `stop_decay` is set.
    pub fn update_history(&mut self, stop_decay: bool, decay: f32) {
        for e in self.h_edges.iter_mut().chain(self.v_edges.iter_mut()) {
            let of = e.overflow();
            if of > 0 {
                e.last_usage += of as f32;
            } else if !stop_decay {
                e.last_usage *= decay;
            }
        }
    }

    /// True when the edge's usage exceeds its capacity by more than `threshold`
    /// (a negative threshold also flags edges that are merely full).
    #[inline(always)]
    pub fn is_congested(&self, dir: EdgeDir, idx: usize, threshold: i32) -> bool {
        let e = self.edge(dir, idx);
        e.usage as i64 > e.cap as i64 + threshold as i64
    }
}

#[inline(always)]
fn apply_delta(usage: u32, delta: i32) -> u32 {
    if delta >= 0 {
        usage + delta as u32
    } else {
        debug_assert!(
            usage >= delta.unsigned_abs(),
            "edge usage would go negative ({} {})",
            usage,
            delta
        );
        usage.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: u32, y: u32, z: u8) -> GridCoord {
        GridCoord::new(x, y, z)
    }

    fn adj(from: GridCoord, to: GridCoord, cap: i64) -> CapacityAdjustment {
        CapacityAdjustment {
            from,
            to,
            new_capacity: cap,
        }
    }

    #[test]
    fn aggregate_is_sum_of_layers() {
        let grid = GridSpec::uniform(5, 4, 4, 3);
        let model = EdgeModel::new(&grid);
        assert_eq!(model.h_capacity, 6);
        assert_eq!(model.v_capacity, 6);
        assert_eq!(model.h_edge(0, 0).cap, 6);
        let sum: u32 = (0..4)
            .map(|l| model.edge_3d(EdgeDir::Horizontal, l, model.h_index(2, 3)).cap)
            .sum();
        assert_eq!(sum, model.h_edge(2, 3).cap);
    }

    #[test]
    fn adjustment_reduces_both_views_and_is_idempotent() {
        let grid = GridSpec::uniform(4, 4, 2, 5);
        let mut model = EdgeModel::new(&grid);
        let a = adj(c(1, 1, 0), c(2, 1, 0), 2);
        model.add_adjustment(&a).unwrap();
        assert_eq!(model.get_edge_capacity(c(1, 1, 0), c(2, 1, 0)), Some(2));
        assert_eq!(model.h_edge(1, 1).cap, 2);
        assert_eq!(model.h_edge(1, 1).red, 3);

        model.add_adjustment(&a).unwrap();
        assert_eq!(model.get_edge_capacity(c(1, 1, 0), c(2, 1, 0)), Some(2));
        assert_eq!(model.h_edge(1, 1).cap, 2);
        assert_eq!(model.h_edge(1, 1).red, 3);

        let idx = model.h_index(1, 1);
        let sum: u32 = (0..2)
            .map(|l| model.edge_3d(EdgeDir::Horizontal, l, idx).cap)
            .sum();
        assert_eq!(sum, model.h_edge(1, 1).cap);
    }

    #[test]
    fn negative_adjustment_clamps_to_zero() {
        let grid = GridSpec::uniform(3, 3, 1, 4);
        let mut model = EdgeModel::new(&grid);
        model
            .add_adjustment(&adj(c(0, 0, 0), c(0, 1, 0), -7))
            .unwrap();
        assert_eq!(model.get_edge_capacity(c(0, 0, 0), c(0, 1, 0)), Some(0));
        assert_eq!(model.v_edge(0, 0).cap, 0);
        assert_eq!(model.v_edge(0, 0).red, 4);
    }

    #[test]
    fn non_adjacent_adjustment_is_rejected() {
        let grid = GridSpec::uniform(3, 3, 2, 4);
        let mut model = EdgeModel::new(&grid);
        assert!(model.add_adjustment(&adj(c(0, 0, 0), c(2, 0, 0), 1)).is_err());
        assert!(model.add_adjustment(&adj(c(0, 0, 0), c(1, 0, 1), 1)).is_err());
    }

    #[test]
    fn usage_and_overflow() {
        let grid = GridSpec::uniform(3, 3, 1, 1);
        let mut model = EdgeModel::new(&grid);
        let path = [c(0, 0, 0), c(1, 0, 0), c(2, 0, 0)];
        model.add_route_usage(&path, 1);
        model.add_route_usage(&path, 1);
        let stats = model.overflow_2d();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.max, 1);
        assert_eq!(stats.overflowed_edges, 2);
        assert!(model.is_congested(EdgeDir::Horizontal, model.h_index(0, 0), 0));

        model.add_route_usage(&path, -1);
        assert_eq!(model.overflow_2d().total, 0);
        assert!(model.is_congested(EdgeDir::Horizontal, model.h_index(0, 0), -1));
        assert!(!model.is_congested(EdgeDir::Horizontal, model.h_index(0, 0), 0));
    }

    #[test]
    fn history_accumulates_and_decays() {
        let grid = GridSpec::uniform(2, 1, 1, 1);
        let mut model = EdgeModel::new(&grid);
        let path = [c(0, 0, 0), c(1, 0, 0)];
        model.add_route_usage(&path, 3);
        model.update_history(false, 0.5);
        model.update_history(false, 0.5);
        assert_eq!(model.h_edge(0, 0).last_usage, 4.0);

        model.add_route_usage(&path, -3);
        model.update_history(true, 0.5);
        assert_eq!(model.h_edge(0, 0).last_usage, 4.0);
        model.update_history(false, 0.5);
        assert_eq!(model.h_edge(0, 0).last_usage, 2.0);
    }

    #[test]
    fn current_resource_tracks_layer_usage() {
        let grid = GridSpec::uniform(3, 3, 2, 2);
        let mut model = EdgeModel::new(&grid);
        model.add_usage_3d(c(0, 0, 0), c(1, 0, 0), 3);
        assert_eq!(
            model.get_edge_current_resource(c(0, 0, 0), c(1, 0, 0)),
            Some(-1)
        );
        assert_eq!(model.overflow_3d().total, 1);
        assert_eq!(model.layered_usage(EdgeDir::Horizontal, model.h_index(0, 0)), 3);
    }
}
