use grt_common::db::core::{GridSpec, NetData};
use grt_common::db::indices::NetId;
use grt_common::error::{Result, RouteError};
use std::collections::HashMap;

/// Inclusive range of layers touched at one point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerSpan {
    pub bot: u8,
    pub top: u8,
}

impl LayerSpan {
    pub fn single(layer: u8) -> Self {
        Self {
            bot: layer,
            top: layer,
        }
    }

    pub fn include(&mut self, layer: u8) {
        self.bot = self.bot.min(layer);
        self.top = self.top.max(layer);
    }

    /// Layers between `layer` and the nearest layer of the span.
    pub fn distance(&self, layer: u8) -> u8 {
        if layer < self.bot {
            self.bot - layer
        } else {
            layer.saturating_sub(self.top)
        }
    }
}

/// A net after pin de-duplication. `deg` counts distinct pin tiles; co-located pins on
/// different layers collapse into one pin whose `pin_l` span covers all of them.
#[derive(Clone, Debug)]
pub struct Net {
    pub id: NetId,
    pub name: String,
    pub ext_id: u32,
    pub num_pins: usize,
    pub deg: usize,
    pub pin_x: Vec<u32>,
    pub pin_y: Vec<u32>,
    pub pin_l: Vec<LayerSpan>,
    pub alpha: f32,
}

impl Net {
    pub fn from_data(id: NetId, data: &NetData, grid: &GridSpec) -> Result<Self> {
        let mut pin_x: Vec<u32> = Vec::with_capacity(data.pins.len());
        let mut pin_y: Vec<u32> = Vec::with_capacity(data.pins.len());
        let mut pin_l: Vec<LayerSpan> = Vec::with_capacity(data.pins.len());
        let mut seen: HashMap<(u32, u32), usize> = HashMap::with_capacity(data.pins.len());

        for pin in &data.pins {
            if !grid.contains(*pin) {
                return Err(RouteError::InvalidNet {
                    net: data.name.clone(),
                    msg: format!(
                        "pin {:?} outside the {}x{}x{} grid",
                        pin,
                        grid.x_grids,
                        grid.y_grids,
                        grid.num_layers()
                    ),
                });
            }
            match seen.get(&(pin.x, pin.y)) {
                Some(&i) => pin_l[i].include(pin.z),
                None => {
                    seen.insert((pin.x, pin.y), pin_x.len());
                    pin_x.push(pin.x);
                    pin_y.push(pin.y);
                    pin_l.push(LayerSpan::single(pin.z));
                }
            }
        }

        Ok(Self {
            id,
            name: data.name.clone(),
            ext_id: data.id,
            num_pins: data.pins.len(),
            deg: pin_x.len(),
            pin_x,
            pin_y,
            pin_l,
            alpha: data.alpha,
        })
    }

    pub fn pins_xy(&self) -> Vec<(u32, u32)> {
        self.pin_x.iter().copied().zip(self.pin_y.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grt_common::geom::coord::GridCoord;

    #[test]
    fn co_located_pins_merge() {
        let grid = GridSpec::uniform(8, 8, 3, 4);
        let data = NetData {
            name: "n".to_string(),
            id: 7,
            pins: vec![
                GridCoord::new(1, 1, 0),
                GridCoord::new(5, 2, 0),
                GridCoord::new(1, 1, 2),
            ],
            alpha: 0.0,
        };
        let net = Net::from_data(NetId::new(0), &data, &grid).unwrap();
        assert_eq!(net.num_pins, 3);
        assert_eq!(net.deg, 2);
        assert_eq!(net.pin_l[0], LayerSpan { bot: 0, top: 2 });
    }

    #[test]
    fn pin_outside_grid_is_rejected() {
        let grid = GridSpec::uniform(4, 4, 1, 4);
        let data = NetData {
            name: "n".to_string(),
            id: 0,
            pins: vec![GridCoord::new(1, 1, 0), GridCoord::new(4, 0, 0)],
            alpha: 0.0,
        };
        assert!(Net::from_data(NetId::new(0), &data, &grid).is_err());
    }

    #[test]
    fn span_distance() {
        let span = LayerSpan { bot: 2, top: 4 };
        assert_eq!(span.distance(0), 2);
        assert_eq!(span.distance(3), 0);
        assert_eq!(span.distance(6), 2);
    }
}
