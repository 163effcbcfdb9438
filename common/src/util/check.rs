use crate::db::core::{GridSpec, NetRoute, RoutingDB};
use crate::geom::coord::GridCoord;
use rayon::prelude::*;
use std::collections::HashMap;

/// Per-layer edge usage recomputed from a set of 3D routes.
pub struct UsageMap {
    pub x_grids: u32,
    pub y_grids: u32,
    pub num_layers: usize,
    /// `[layer][y * (x_grids - 1) + x]`, edge between `(x, y)` and `(x + 1, y)`.
    pub h_usage: Vec<Vec<u32>>,
    pub h_cap: Vec<Vec<u32>>,
    /// `[layer][y * x_grids + x]`, edge between `(x, y)` and `(x, y + 1)`.
    pub v_usage: Vec<Vec<u32>>,
    pub v_cap: Vec<Vec<u32>>,
}

impl UsageMap {
    pub fn new(db: &RoutingDB) -> Self {
        let grid = &db.grid;
        let xg = grid.x_grids;
        let yg = grid.y_grids;
        let h_len = (xg.saturating_sub(1) * yg) as usize;
        let v_len = (xg * yg.saturating_sub(1)) as usize;
        let mut map = Self {
            x_grids: xg,
            y_grids: yg,
            num_layers: grid.num_layers(),
            h_usage: vec![vec![0; h_len]; grid.num_layers()],
            h_cap: grid
                .layers
                .iter()
                .map(|l| vec![l.h_capacity; h_len])
                .collect(),
            v_usage: vec![vec![0; v_len]; grid.num_layers()],
            v_cap: grid
                .layers
                .iter()
                .map(|l| vec![l.v_capacity; v_len])
                .collect(),
        };
        for adj in &db.adjustments {
            let cap = adj.new_capacity.max(0) as u32;
            if let Some((horizontal, idx)) = map.edge_index(adj.from, adj.to) {
                let layer = adj.from.z as usize;
                if horizontal {
                    map.h_cap[layer][idx] = cap;
                } else {
                    map.v_cap[layer][idx] = cap;
                }
            }
        }
        map
    }

    /// `(is_horizontal, index)` of the edge joining two planar-adjacent cells of one layer.
    pub fn edge_index(&self, a: GridCoord, b: GridCoord) -> Option<(bool, usize)> {
        if a.z != b.z || (a.z as usize) >= self.num_layers {
            return None;
        }
        if a.y == b.y && a.x.abs_diff(b.x) == 1 && a.x.max(b.x) < self.x_grids && a.y < self.y_grids {
            let x = a.x.min(b.x);
            return Some((true, (a.y * (self.x_grids - 1) + x) as usize));
        }
        if a.x == b.x && a.y.abs_diff(b.y) == 1 && a.y.max(b.y) < self.y_grids && a.x < self.x_grids {
            let y = a.y.min(b.y);
            return Some((false, (y * self.x_grids + a.x) as usize));
        }
        None
    }

    pub fn add_route(&mut self, route: &NetRoute) {
        for seg in route.segments.iter().filter(|s| !s.is_via()) {
            let cells = seg.cells();
            for w in cells.windows(2) {
                if let Some((horizontal, idx)) = self.edge_index(w[0], w[1]) {
                    let layer = w[0].z as usize;
                    if horizontal {
                        self.h_usage[layer][idx] += 1;
                    } else {
                        self.v_usage[layer][idx] += 1;
                    }
                }
            }
        }
    }

    /// `(total, max)` overflow over all per-layer edges.
    pub fn overflow(&self) -> (u64, u32) {
        let mut total = 0u64;
        let mut max = 0u32;
        for l in 0..self.num_layers {
            let pairs = self.h_usage[l]
                .iter()
                .zip(&self.h_cap[l])
                .chain(self.v_usage[l].iter().zip(&self.v_cap[l]));
            for (&u, &c) in pairs {
                let of = u.saturating_sub(c);
                total += of as u64;
                max = max.max(of);
            }
        }
        (total, max)
    }

    /// Max usage/capacity ratio over the four edges leaving each tile, all layers summed.
    pub fn tile_congestion(&self) -> Vec<f32> {
        let xg = self.x_grids;
        let yg = self.y_grids;
        let mut out = vec![0.0f32; (xg * yg) as usize];
        let ratio = |usage: &Vec<Vec<u32>>, cap: &Vec<Vec<u32>>, idx: usize| {
            let u: u32 = usage.iter().map(|l| l[idx]).sum();
            let c: u32 = cap.iter().map(|l| l[idx]).sum();
            if c == 0 {
                if u > 0 { 2.0 } else { 0.0 }
            } else {
                u as f32 / c as f32
            }
        };
        for y in 0..yg {
            for x in 0..xg {
                let mut worst = 0.0f32;
                if x + 1 < xg {
                    worst = worst.max(ratio(&self.h_usage, &self.h_cap, (y * (xg - 1) + x) as usize));
                }
                if x > 0 {
                    worst = worst.max(ratio(&self.h_usage, &self.h_cap, (y * (xg - 1) + x - 1) as usize));
                }
                if y + 1 < yg {
                    worst = worst.max(ratio(&self.v_usage, &self.v_cap, (y * xg + x) as usize));
                }
                if y > 0 {
                    worst = worst.max(ratio(&self.v_usage, &self.v_cap, ((y - 1) * xg + x) as usize));
                }
                out[(y * xg + x) as usize] = worst;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteReport {
    pub total_overflow: u64,
    pub max_overflow: u32,
    pub wirelength: u64,
    pub vias: u64,
    pub open_nets: usize,
}

/// Checks every net's segments for legality and pin connectivity, then recomputes
/// per-layer overflow. Returns an error describing the first few broken nets.
pub fn verify_routes(db: &RoutingDB, routes: &[NetRoute]) -> Result<RouteReport, String> {
    log::info!("Starting Route Verification...");

    let by_name: HashMap<&str, &NetRoute> = routes.iter().map(|r| (r.name.as_str(), r)).collect();

    let failures: Vec<String> = db
        .nets
        .par_iter()
        .filter_map(|net| {
            let route = by_name.get(net.name.as_str());
            check_net(&db.grid, &net.pins, route.copied())
                .err()
                .map(|e| format!("net '{}': {}", net.name, e))
        })
        .collect();

    let mut usage = UsageMap::new(db);
    for route in routes {
        usage.add_route(route);
    }
    let (total_overflow, max_overflow) = usage.overflow();

    let report = RouteReport {
        total_overflow,
        max_overflow,
        wirelength: routes.iter().map(|r| r.wirelength()).sum(),
        vias: routes.iter().map(|r| r.via_count()).sum(),
        open_nets: failures.len(),
    };

    if failures.is_empty() {
        log::info!(
            "\x1b[32mPASS\x1b[0m: all nets connected (WL {}, vias {}, overflow {})",
            report.wirelength,
            report.vias,
            report.total_overflow
        );
        Ok(report)
    } else {
        for f in failures.iter().take(10) {
            log::error!("\x1b[31mFAIL\x1b[0m: {}", f);
        }
        Err(format!(
            "{} nets failed verification; first: {}",
            failures.len(),
            failures[0]
        ))
    }
}

fn check_net(grid: &GridSpec, pins: &[GridCoord], route: Option<&NetRoute>) -> Result<(), String> {
    let mut distinct: Vec<GridCoord> = pins.to_vec();
    distinct.sort();
    distinct.dedup();
    if distinct.is_empty() {
        return Ok(());
    }
    // Co-located pins form a degenerate net that needs no wiring.
    let needs_wires = distinct.iter().any(|p| !p.same_xy(&distinct[0]));

    let segments = route.map(|r| r.segments.as_slice()).unwrap_or(&[]);
    if segments.is_empty() {
        return if needs_wires {
            Err("no route".to_string())
        } else {
            Ok(())
        };
    }

    let mut dsu = DisjointSet::default();
    for seg in segments {
        if !seg.is_well_formed() {
            return Err(format!("malformed segment {:?}", seg));
        }
        if !grid.contains(seg.start()) || !grid.contains(seg.end()) {
            return Err(format!("segment {:?} leaves the grid", seg));
        }
        let cells = seg.cells();
        for w in cells.windows(2) {
            dsu.union(w[0], w[1]);
        }
        dsu.find(cells[0]);
    }

    let root = dsu
        .find_existing(distinct[0])
        .ok_or_else(|| format!("pin {:?} not touched by any segment", distinct[0]))?;
    for pin in &distinct[1..] {
        match dsu.find_existing(*pin) {
            Some(r) if r == root => {}
            Some(_) => return Err(format!("pin {:?} disconnected", pin)),
            None => return Err(format!("pin {:?} not touched by any segment", pin)),
        }
    }
    Ok(())
}

#[derive(Default)]
struct DisjointSet {
    ids: HashMap<GridCoord, usize>,
    parent: Vec<usize>,
}

impl DisjointSet {
    fn id(&mut self, c: GridCoord) -> usize {
        if let Some(&id) = self.ids.get(&c) {
            return id;
        }
        let id = self.parent.len();
        self.parent.push(id);
        self.ids.insert(c, id);
        id
    }

    fn root(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn find(&mut self, c: GridCoord) -> usize {
        let id = self.id(c);
        self.root(id)
    }

    fn find_existing(&mut self, c: GridCoord) -> Option<usize> {
        let id = *self.ids.get(&c)?;
        Some(self.root(id))
    }

    fn union(&mut self, a: GridCoord, b: GridCoord) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}
