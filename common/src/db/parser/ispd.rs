//! ISPD'08 global-routing benchmark reader and route writer.
//!
//! Capacities in the benchmark are given in length units; they are converted to track
//! counts by dividing by `min_width + min_spacing` of the layer. Layers are 1-based in
//! the file and 0-based in memory.

use crate::db::core::{GridSpec, LayerData, NetRoute, RouteSegment, RoutingDB};
use crate::error::RouteError;
use crate::geom::coord::GridCoord;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

struct Lines<R: BufRead> {
    inner: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> Lines<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: reader.lines(),
            line_no: 0,
        }
    }

    /// Next non-empty, non-comment line split into tokens.
    fn next_tokens(&mut self) -> Result<Option<Vec<String>>> {
        for line in self.inner.by_ref() {
            let line = line?;
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Ok(Some(line.split_whitespace().map(str::to_string).collect()));
        }
        Ok(None)
    }

    fn expect_tokens(&mut self, what: &str) -> Result<Vec<String>> {
        match self.next_tokens()? {
            Some(t) => Ok(t),
            None => Err(self.error(format!("unexpected end of file, expected {}", what))),
        }
    }

    fn error(&self, msg: String) -> anyhow::Error {
        RouteError::Parse {
            line: self.line_no,
            msg,
        }
        .into()
    }

    fn number<T: std::str::FromStr>(&self, tok: &str) -> Result<T> {
        tok.parse::<T>()
            .map_err(|_| self.error(format!("expected a number, found '{}'", tok)))
    }

    /// Parses `<keyword...> v1 v2 ... vN` and returns the trailing `count` values.
    fn layer_values(&mut self, keyword: &str, count: usize) -> Result<Vec<u32>> {
        let toks = self.expect_tokens(keyword)?;
        let kw_len = keyword.split_whitespace().count();
        if toks.len() < kw_len + count || toks[..kw_len].join(" ") != keyword {
            return Err(self.error(format!("expected '{}' with {} values", keyword, count)));
        }
        toks[kw_len..kw_len + count]
            .iter()
            .map(|t| self.number::<u32>(t))
            .collect()
    }
}

pub fn parse(filename: &str) -> Result<RoutingDB> {
    log::info!("Parsing ISPD benchmark: {}", filename);
    let file = File::open(filename).context(format!("Failed to open benchmark: {}", filename))?;
    parse_reader(BufReader::new(file))
}

pub fn parse_reader<R: BufRead>(reader: R) -> Result<RoutingDB> {
    let mut lines = Lines::new(reader);

    let toks = lines.expect_tokens("grid header")?;
    if toks.len() != 4 || toks[0] != "grid" {
        return Err(lines.error("expected 'grid <x> <y> <layers>'".to_string()));
    }
    let x_grids: u32 = lines.number(&toks[1])?;
    let y_grids: u32 = lines.number(&toks[2])?;
    let num_layers: usize = lines.number(&toks[3])?;

    let v_caps = lines.layer_values("vertical capacity", num_layers)?;
    let h_caps = lines.layer_values("horizontal capacity", num_layers)?;
    let min_width = lines.layer_values("minimum width", num_layers)?;
    let min_spacing = lines.layer_values("minimum spacing", num_layers)?;
    let via_spacing = lines.layer_values("via spacing", num_layers)?;

    let toks = lines.expect_tokens("grid origin")?;
    if toks.len() != 4 {
        return Err(lines.error("expected '<llx> <lly> <tile_w> <tile_h>'".to_string()));
    }
    let origin_x: i64 = lines.number(&toks[0])?;
    let origin_y: i64 = lines.number(&toks[1])?;
    let tile_width: i64 = lines.number(&toks[2])?;
    let tile_height: i64 = lines.number(&toks[3])?;

    let pitch: Vec<u32> = (0..num_layers)
        .map(|l| (min_width[l] + min_spacing[l]).max(1))
        .collect();

    let layers = (0..num_layers)
        .map(|l| {
            let h = h_caps[l] / pitch[l];
            let v = v_caps[l] / pitch[l];
            LayerData {
                name: format!("M{}", l + 1),
                index: l as u8,
                direction: LayerData::infer_direction(h, v),
                h_capacity: h,
                v_capacity: v,
                min_width: min_width[l],
                min_spacing: min_spacing[l],
                via_spacing: via_spacing[l],
            }
        })
        .collect();

    let grid = GridSpec {
        x_grids,
        y_grids,
        origin_x,
        origin_y,
        tile_width,
        tile_height,
        layers,
    };
    grid.validate()?;
    let mut db = RoutingDB::new(grid);

    let toks = lines.expect_tokens("net count")?;
    if toks.len() != 3 || toks[0] != "num" || toks[1] != "net" {
        return Err(lines.error("expected 'num net <count>'".to_string()));
    }
    let num_nets: usize = lines.number(&toks[2])?;

    for _ in 0..num_nets {
        let toks = lines.expect_tokens("net header")?;
        if toks.len() < 3 {
            return Err(lines.error("expected '<name> <id> <pins> [min_width]'".to_string()));
        }
        let name = toks[0].clone();
        let id: u32 = lines.number(&toks[1])?;
        let num_pins: usize = lines.number(&toks[2])?;

        let mut pins = Vec::with_capacity(num_pins);
        for _ in 0..num_pins {
            let toks = lines.expect_tokens("pin")?;
            if toks.len() != 3 {
                return Err(lines.error("expected '<x> <y> <layer>'".to_string()));
            }
            let x: i64 = lines.number(&toks[0])?;
            let y: i64 = lines.number(&toks[1])?;
            let layer: usize = lines.number(&toks[2])?;
            if layer == 0 || layer > num_layers {
                return Err(lines.error(format!("pin layer {} out of range", layer)));
            }
            let (gx, gy) = db.grid.tile_of(x, y);
            pins.push(GridCoord::new(gx, gy, (layer - 1) as u8));
        }
        let idx = db.add_net(name, pins);
        db.nets[idx].id = id;
    }

    if let Some(toks) = lines.next_tokens()? {
        let num_adj: usize = lines.number(&toks[0])?;
        for _ in 0..num_adj {
            let toks = lines.expect_tokens("capacity adjustment")?;
            if toks.len() != 7 {
                return Err(lines.error("expected 'x1 y1 l1 x2 y2 l2 cap'".to_string()));
            }
            let v: Vec<i64> = toks
                .iter()
                .map(|t| lines.number::<i64>(t))
                .collect::<Result<_>>()?;
            if v[2] < 1 || v[2] as usize > num_layers || v[5] < 1 || v[5] as usize > num_layers {
                return Err(lines.error("adjustment layer out of range".to_string()));
            }
            if v[..2].iter().chain(&v[3..5]).any(|&c| c < 0) {
                return Err(lines.error("negative adjustment coordinate".to_string()));
            }
            let layer = (v[2] - 1) as usize;
            let from = GridCoord::new(v[0] as u32, v[1] as u32, layer as u8);
            let to = GridCoord::new(v[3] as u32, v[4] as u32, (v[5] - 1) as u8);
            db.add_adjustment(from, to, v[6] / pitch[layer] as i64);
        }
    }

    log::info!(
        "Benchmark: {}x{} tiles, {} layers, {} nets, {} adjustments",
        db.grid.x_grids,
        db.grid.y_grids,
        db.grid.num_layers(),
        db.num_nets(),
        db.adjustments.len()
    );
    Ok(db)
}

/// Writes `db` back out in benchmark form, one track per capacity unit.
pub fn write_benchmark(filename: &str, db: &RoutingDB) -> Result<()> {
    let file = File::create(filename).context(format!("Failed to create {}", filename))?;
    let mut w = BufWriter::new(file);
    let grid = &db.grid;
    let pitch = |l: &LayerData| (l.min_width + l.min_spacing).max(1);

    writeln!(w, "grid {} {} {}", grid.x_grids, grid.y_grids, grid.num_layers())?;
    let join = |f: &dyn Fn(&LayerData) -> u32| {
        grid.layers
            .iter()
            .map(|l| f(l).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    writeln!(w, "vertical capacity {}", join(&|l| l.v_capacity * pitch(l)))?;
    writeln!(w, "horizontal capacity {}", join(&|l| l.h_capacity * pitch(l)))?;
    writeln!(w, "minimum width {}", join(&|l| l.min_width))?;
    writeln!(w, "minimum spacing {}", join(&|l| l.min_spacing))?;
    writeln!(w, "via spacing {}", join(&|l| l.via_spacing))?;
    writeln!(
        w,
        "{} {} {} {}",
        grid.origin_x, grid.origin_y, grid.tile_width, grid.tile_height
    )?;
    writeln!(w)?;

    writeln!(w, "num net {}", db.nets.len())?;
    for net in &db.nets {
        writeln!(w, "{} {} {} 1", net.name, net.id, net.pins.len())?;
        for pin in &net.pins {
            let (x, y) = grid.tile_center(pin.x, pin.y);
            writeln!(w, "{} {} {}", x, y, pin.z + 1)?;
        }
    }
    writeln!(w)?;

    writeln!(w, "{}", db.adjustments.len())?;
    for adj in &db.adjustments {
        let p = pitch(&grid.layers[adj.from.z as usize]) as i64;
        writeln!(
            w,
            "{} {} {} {} {} {} {}",
            adj.from.x,
            adj.from.y,
            adj.from.z + 1,
            adj.to.x,
            adj.to.y,
            adj.to.z + 1,
            adj.new_capacity * p
        )?;
    }
    w.flush()?;
    Ok(())
}

/// Writes routes as `(x,y,l)-(x,y,l)` lines in real coordinates (tile centres), one
/// block per net terminated by `!`.
pub fn write_routes(filename: &str, db: &RoutingDB, routes: &[NetRoute]) -> Result<()> {
    if let Some(parent) = Path::new(filename).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(filename).context(format!("Failed to create {}", filename))?;
    let mut w = BufWriter::new(file);

    for route in routes {
        writeln!(w, "{} {} {}", route.name, route.id, route.segments.len())?;
        for seg in &route.segments {
            let (x1, y1) = db.grid.tile_center(seg.init_x, seg.init_y);
            let (x2, y2) = db.grid.tile_center(seg.final_x, seg.final_y);
            writeln!(
                w,
                "({},{},{})-({},{},{})",
                x1,
                y1,
                seg.init_layer + 1,
                x2,
                y2,
                seg.final_layer + 1
            )?;
        }
        writeln!(w, "!")?;
    }
    w.flush()?;
    log::info!("Wrote {} net routes to {}", routes.len(), filename);
    Ok(())
}

pub fn parse_routes(filename: &str, db: &RoutingDB) -> Result<Vec<NetRoute>> {
    let file = File::open(filename).context(format!("Failed to open routes: {}", filename))?;
    parse_routes_reader(BufReader::new(file), &db.grid)
}

/// Reads a route file produced by `write_routes`, mapping real coordinates back to
/// tiles.
pub fn parse_routes_reader<R: BufRead>(reader: R, grid: &GridSpec) -> Result<Vec<NetRoute>> {
    let mut lines = Lines::new(reader);
    let mut routes = Vec::new();

    while let Some(header) = lines.next_tokens()? {
        if header.len() < 3 {
            return Err(lines.error("expected '<name> <id> <segments>'".to_string()));
        }
        let id: u32 = lines.number(&header[1])?;
        let count: usize = lines.number(&header[2])?;
        let mut segments = Vec::with_capacity(count);
        loop {
            let toks = lines.expect_tokens("a segment or '!'")?;
            if toks[0] == "!" {
                break;
            }
            let text = toks.concat();
            let (a, b) = text
                .split_once(")-(")
                .ok_or_else(|| lines.error(format!("malformed segment '{}'", text)))?;
            let point = |s: &str| -> Result<GridCoord> {
                let fields: Vec<&str> = s
                    .trim_matches(|c| c == '(' || c == ')')
                    .split(',')
                    .collect();
                if fields.len() != 3 {
                    return Err(lines.error(format!("malformed point '{}'", s)));
                }
                let x: i64 = lines.number(fields[0])?;
                let y: i64 = lines.number(fields[1])?;
                let l: u8 = lines.number(fields[2])?;
                if l == 0 || l as usize > grid.num_layers() {
                    return Err(lines.error(format!("layer {} out of range", l)));
                }
                let (gx, gy) = grid.tile_of(x, y);
                Ok(GridCoord::new(gx, gy, l - 1))
            };
            segments.push(RouteSegment::new(point(a)?, point(b)?));
        }
        if segments.len() != count {
            log::warn!(
                "Net {} declares {} segments but lists {}",
                header[0],
                count,
                segments.len()
            );
        }
        routes.push(NetRoute {
            name: header[0].clone(),
            id,
            segments,
        });
    }
    Ok(routes)
}
