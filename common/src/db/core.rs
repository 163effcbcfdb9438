use crate::error::{Result, RouteError};
use crate::geom::coord::GridCoord;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerDirection {
    Vertical,
    Horizontal,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct LayerData {
    pub name: String,
    pub index: u8,
    pub direction: LayerDirection,
    /// Tracks per tile crossing a horizontal edge.
    pub h_capacity: u32,
    /// Tracks per tile crossing a vertical edge.
    pub v_capacity: u32,
    pub min_width: u32,
    pub min_spacing: u32,
    pub via_spacing: u32,
}

impl LayerData {
    /// A layer whose only non-zero capacity is in one direction prefers that direction.
    pub fn infer_direction(h_capacity: u32, v_capacity: u32) -> LayerDirection {
        match (h_capacity > 0, v_capacity > 0) {
            (true, false) => LayerDirection::Horizontal,
            (false, true) => LayerDirection::Vertical,
            _ => LayerDirection::Unknown,
        }
    }
}

/// Tile grid geometry. The affine map sends tile `(gx, gy)` to the real rectangle
/// starting at `origin + (gx * tile_width, gy * tile_height)`.
#[derive(Clone, Debug)]
pub struct GridSpec {
    pub x_grids: u32,
    pub y_grids: u32,
    pub origin_x: i64,
    pub origin_y: i64,
    pub tile_width: i64,
    pub tile_height: i64,
    pub layers: Vec<LayerData>,
}

impl GridSpec {
    /// Uniform grid. A single layer carries `capacity` in both directions; with more
    /// layers, even layers are horizontal and odd layers vertical.
    pub fn uniform(x_grids: u32, y_grids: u32, num_layers: u8, capacity: u32) -> Self {
        let layers = (0..num_layers)
            .map(|l| {
                let (h, v) = if num_layers == 1 {
                    (capacity, capacity)
                } else if l % 2 == 0 {
                    (capacity, 0)
                } else {
                    (0, capacity)
                };
                LayerData {
                    name: format!("M{}", l + 1),
                    index: l,
                    direction: LayerData::infer_direction(h, v),
                    h_capacity: h,
                    v_capacity: v,
                    min_width: 1,
                    min_spacing: 1,
                    via_spacing: 1,
                }
            })
            .collect();

        Self {
            x_grids,
            y_grids,
            origin_x: 0,
            origin_y: 0,
            tile_width: 1,
            tile_height: 1,
            layers,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.x_grids < 2 && self.y_grids < 2 {
            return Err(RouteError::InvalidGrid(format!(
                "grid {}x{} has no routing edges",
                self.x_grids, self.y_grids
            )));
        }
        if self.x_grids == 0 || self.y_grids == 0 {
            return Err(RouteError::InvalidGrid("zero grid dimension".to_string()));
        }
        if self.layers.is_empty() || self.layers.len() > u8::MAX as usize {
            return Err(RouteError::InvalidGrid(format!(
                "unsupported layer count {}",
                self.layers.len()
            )));
        }
        if self.tile_width <= 0 || self.tile_height <= 0 {
            return Err(RouteError::InvalidGrid(format!(
                "non-positive tile size {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        Ok(())
    }

    /// Maps a real coordinate onto its tile, clamping to the grid.
    pub fn tile_of(&self, x: i64, y: i64) -> (u32, u32) {
        let gx = ((x - self.origin_x).div_euclid(self.tile_width)).clamp(0, self.x_grids as i64 - 1);
        let gy =
            ((y - self.origin_y).div_euclid(self.tile_height)).clamp(0, self.y_grids as i64 - 1);
        (gx as u32, gy as u32)
    }

    pub fn tile_center(&self, gx: u32, gy: u32) -> (i64, i64) {
        (
            self.origin_x + gx as i64 * self.tile_width + self.tile_width / 2,
            self.origin_y + gy as i64 * self.tile_height + self.tile_height / 2,
        )
    }

    pub fn contains(&self, c: GridCoord) -> bool {
        c.x < self.x_grids && c.y < self.y_grids && (c.z as usize) < self.layers.len()
    }
}

#[derive(Clone, Debug)]
pub struct NetData {
    pub name: String,
    pub id: u32,
    /// Pin tiles; `z` is the pin layer.
    pub pins: Vec<GridCoord>,
    /// Timing weight: larger values make the net prefer shorter paths over congestion relief.
    pub alpha: f32,
}

/// Sets the capacity of the edge between two adjacent cells of one layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityAdjustment {
    pub from: GridCoord,
    pub to: GridCoord,
    pub new_capacity: i64,
}

/// One piece of a net's 3D route: a via (same x,y) or a same-layer straight wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteSegment {
    pub init_x: u32,
    pub init_y: u32,
    pub init_layer: u8,
    pub final_x: u32,
    pub final_y: u32,
    pub final_layer: u8,
}

impl RouteSegment {
    pub fn new(a: GridCoord, b: GridCoord) -> Self {
        Self {
            init_x: a.x,
            init_y: a.y,
            init_layer: a.z,
            final_x: b.x,
            final_y: b.y,
            final_layer: b.z,
        }
    }

    pub fn start(&self) -> GridCoord {
        GridCoord::new(self.init_x, self.init_y, self.init_layer)
    }

    pub fn end(&self) -> GridCoord {
        GridCoord::new(self.final_x, self.final_y, self.final_layer)
    }

    pub fn is_via(&self) -> bool {
        self.init_x == self.final_x && self.init_y == self.final_y
    }

    /// Wire length in tiles; zero for vias.
    pub fn length(&self) -> u32 {
        self.init_x.abs_diff(self.final_x) + self.init_y.abs_diff(self.final_y)
    }

    /// A via, or a wire on one layer that moves along exactly one axis.
    pub fn is_well_formed(&self) -> bool {
        if self.is_via() {
            return self.init_layer != self.final_layer;
        }
        self.init_layer == self.final_layer
            && (self.init_x == self.final_x || self.init_y == self.final_y)
    }

    /// Every grid cell the segment touches, in order from `start` to `end`.
    pub fn cells(&self) -> Vec<GridCoord> {
        let a = self.start();
        let b = self.end();
        if self.is_via() {
            let (lo, hi) = (a.z.min(b.z), a.z.max(b.z));
            let mut cells: Vec<GridCoord> =
                (lo..=hi).map(|z| GridCoord::new(a.x, a.y, z)).collect();
            if a.z > b.z {
                cells.reverse();
            }
            return cells;
        }
        let steps = self.length();
        (0..=steps)
            .map(|i| {
                let x = step_toward(a.x, b.x, i);
                let y = step_toward(a.y, b.y, i);
                GridCoord::new(x, y, a.z)
            })
            .collect()
    }
}

fn step_toward(from: u32, to: u32, i: u32) -> u32 {
    if to >= from {
        (from + i).min(to)
    } else {
        from.saturating_sub(i).max(to)
    }
}

#[derive(Clone, Debug, Default)]
pub struct NetRoute {
    pub name: String,
    pub id: u32,
    pub segments: Vec<RouteSegment>,
}

impl NetRoute {
    pub fn wirelength(&self) -> u64 {
        self.segments.iter().map(|s| s.length() as u64).sum()
    }

    pub fn via_count(&self) -> u64 {
        self.segments
            .iter()
            .filter(|s| s.is_via())
            .map(|s| s.init_layer.abs_diff(s.final_layer) as u64)
            .sum()
    }
}

/// Everything the router consumes from the outside world.
#[derive(Debug)]
pub struct RoutingDB {
    pub grid: GridSpec,
    pub nets: Vec<NetData>,
    pub adjustments: Vec<CapacityAdjustment>,
    pub net_name_map: HashMap<String, usize>,
}

impl RoutingDB {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            nets: Vec::new(),
            adjustments: Vec::new(),
            net_name_map: HashMap::new(),
        }
    }

    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    pub fn add_net(&mut self, name: String, pins: Vec<GridCoord>) -> usize {
        if let Some(&idx) = self.net_name_map.get(&name) {
            self.nets[idx].pins.extend(pins);
            return idx;
        }
        let idx = self.nets.len();
        self.nets.push(NetData {
            name: name.clone(),
            id: idx as u32,
            pins,
            alpha: 0.0,
        });
        self.net_name_map.insert(name, idx);
        idx
    }

    pub fn add_adjustment(&mut self, from: GridCoord, to: GridCoord, new_capacity: i64) {
        self.adjustments.push(CapacityAdjustment {
            from,
            to,
            new_capacity,
        });
    }
}
