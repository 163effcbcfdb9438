use crate::db::core::{NetRoute, RoutingDB};
use crate::util::check::UsageMap;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect as ImageRect;
use std::path::Path;

/// Blue (idle) through green and yellow to red (full); magenta marks overflow.
fn heat_color(ratio: f32) -> Rgb<u8> {
    if ratio > 1.0 {
        return Rgb([255, 0, 255]);
    }
    let r = ratio.clamp(0.0, 1.0);
    if r < 0.5 {
        let t = r * 2.0;
        Rgb([0, (255.0 * t) as u8, (255.0 * (1.0 - t)) as u8])
    } else {
        let t = (r - 0.5) * 2.0;
        Rgb([(255.0 * t) as u8, (255.0 * (1.0 - t * 0.5)) as u8, 0])
    }
}

/// Renders per-tile congestion of the routed design, `pixels_per_tile` pixels per tile.
pub fn draw_congestion(
    db: &RoutingDB,
    routes: &[NetRoute],
    filename: &str,
    pixels_per_tile: u32,
) -> Result<(), String> {
    let mut usage = UsageMap::new(db);
    for route in routes {
        usage.add_route(route);
    }
    let congestion = usage.tile_congestion();

    let scale = pixels_per_tile.max(1);
    let xg = db.grid.x_grids;
    let yg = db.grid.y_grids;
    let mut img = RgbImage::from_pixel(xg * scale, yg * scale, Rgb([20, 20, 20]));

    for y in 0..yg {
        for x in 0..xg {
            let ratio = congestion[(y * xg + x) as usize];
            if ratio <= 0.0 {
                continue;
            }
            // Image rows grow downward; tile rows grow upward.
            let top = (yg - 1 - y) * scale;
            let rect = ImageRect::at((x * scale) as i32, top as i32).of_size(scale, scale);
            draw_filled_rect_mut(&mut img, rect, heat_color(ratio));
        }
    }

    img.save(Path::new(filename))
        .map_err(|e| format!("Failed to save heat map {}: {}", filename, e))?;
    log::info!("Congestion map written to {}", filename);
    Ok(())
}
