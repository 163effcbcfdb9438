use crate::db::core::{GridSpec, RoutingDB};
use crate::geom::coord::GridCoord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct BenchmarkParams {
    pub x_grids: u32,
    pub y_grids: u32,
    pub layers: u8,
    pub capacity: u32,
    pub nets: usize,
    pub max_pins: usize,
    /// Largest bounding box side of a generated net, in tiles.
    pub max_span: u32,
    pub blockages: usize,
    pub seed: u64,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            x_grids: 64,
            y_grids: 64,
            layers: 4,
            capacity: 8,
            nets: 2000,
            max_pins: 6,
            max_span: 16,
            blockages: 20,
            seed: 1,
        }
    }
}

/// Builds a random, reproducible routing problem: clustered multi-pin nets plus a few
/// rectangular capacity blockages on random layers.
pub fn generate_random_benchmark(params: &BenchmarkParams) -> RoutingDB {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut grid = GridSpec::uniform(
        params.x_grids.max(2),
        params.y_grids.max(2),
        params.layers.max(1),
        params.capacity,
    );
    grid.tile_width = 10;
    grid.tile_height = 10;
    let xg = grid.x_grids;
    let yg = grid.y_grids;
    let layers = grid.num_layers() as u8;
    let mut db = RoutingDB::new(grid);

    log::info!(
        "Generating Benchmark: {}x{}x{} tiles, {} nets, up to {} pins",
        xg,
        yg,
        layers,
        params.nets,
        params.max_pins
    );

    let span = params.max_span.max(1);
    for i in 0..params.nets {
        let cx = rng.gen_range(0..xg);
        let cy = rng.gen_range(0..yg);
        let num_pins = rng.gen_range(2..=params.max_pins.max(2));
        let pins = (0..num_pins)
            .map(|_| {
                let dx = rng.gen_range(0..=span) as i64 - (span / 2) as i64;
                let dy = rng.gen_range(0..=span) as i64 - (span / 2) as i64;
                let x = (cx as i64 + dx).clamp(0, xg as i64 - 1) as u32;
                let y = (cy as i64 + dy).clamp(0, yg as i64 - 1) as u32;
                let z = rng.gen_range(0..layers.min(2));
                GridCoord::new(x, y, z)
            })
            .collect();
        db.add_net(format!("n{}", i), pins);
    }

    for _ in 0..params.blockages {
        let layer = rng.gen_range(0..layers);
        let info = &db.grid.layers[layer as usize];
        let (h_cap, v_cap) = (info.h_capacity, info.v_capacity);
        let w = rng.gen_range(1..=(xg / 8).max(1));
        let h = rng.gen_range(1..=(yg / 8).max(1));
        let x0 = rng.gen_range(0..xg.saturating_sub(w).max(1));
        let y0 = rng.gen_range(0..yg.saturating_sub(h).max(1));
        for y in y0..(y0 + h).min(yg) {
            for x in x0..(x0 + w).min(xg) {
                if h_cap > 0 && x + 1 < xg {
                    db.add_adjustment(
                        GridCoord::new(x, y, layer),
                        GridCoord::new(x + 1, y, layer),
                        (h_cap / 4) as i64,
                    );
                }
                if v_cap > 0 && y + 1 < yg {
                    db.add_adjustment(
                        GridCoord::new(x, y, layer),
                        GridCoord::new(x, y + 1, layer),
                        (v_cap / 4) as i64,
                    );
                }
            }
        }
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_design() {
        let params = BenchmarkParams {
            nets: 50,
            ..Default::default()
        };
        let a = generate_random_benchmark(&params);
        let b = generate_random_benchmark(&params);
        assert_eq!(a.nets.len(), 50);
        for (na, nb) in a.nets.iter().zip(&b.nets) {
            assert_eq!(na.pins, nb.pins);
        }
        assert_eq!(a.adjustments, b.adjustments);
        assert!(a.nets.iter().all(|n| n.pins.iter().all(|p| a.grid.contains(*p))));
    }
}
