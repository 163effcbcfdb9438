use crate::layer_assign::NetLayout;
use grt_common::db::core::RouteSegment;
use grt_common::geom::coord::GridCoord;

/// Unit step between two cells, signed per axis.
fn step_of(a: GridCoord, b: GridCoord) -> (i8, i8, i8) {
    let sign = |from: i64, to: i64| (to - from).signum() as i8;
    (
        sign(a.x as i64, b.x as i64),
        sign(a.y as i64, b.y as i64),
        sign(a.z as i64, b.z as i64),
    )
}

/// Collapses a 3D cell path into maximal straight wires and via runs. A run ends
/// whenever the step changes axis or direction, so a path that doubles back keeps
/// both legs.
pub fn path_to_segments(path: &[GridCoord], out: &mut Vec<RouteSegment>) {
    if path.len() < 2 {
        return;
    }
    let mut run_start = path[0];
    let mut run = step_of(path[0], path[1]);
    for k in 1..path.len() {
        let prev = path[k - 1];
        let cur = path[k];
        if prev == cur {
            continue;
        }
        let step = step_of(prev, cur);
        if step != run {
            if run_start != prev {
                out.push(RouteSegment::new(run_start, prev));
            }
            run_start = prev;
            run = step;
        }
    }
    let last = path[path.len() - 1];
    if run_start != last {
        out.push(RouteSegment::new(run_start, last));
    }
}

/// The sole output of the router for one net: wires and vias of every layered path,
/// followed by the via stacks at tree nodes.
pub fn layout_to_segments(layout: &NetLayout) -> Vec<RouteSegment> {
    let mut out = Vec::new();
    for path in &layout.paths {
        path_to_segments(path, &mut out);
    }
    for &(x, y, span) in &layout.stacks {
        out.push(RouteSegment::new(
            GridCoord::new(x, y, span.bot),
            GridCoord::new(x, y, span.top),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::LayerSpan;

    fn c(x: u32, y: u32, z: u8) -> GridCoord {
        GridCoord::new(x, y, z)
    }

    #[test]
    fn runs_collapse_into_segments() {
        let path = [
            c(0, 0, 0),
            c(1, 0, 0),
            c(2, 0, 0),
            c(2, 0, 1),
            c(2, 1, 1),
            c(2, 2, 1),
            c(2, 2, 0),
        ];
        let mut out = Vec::new();
        path_to_segments(&path, &mut out);
        assert_eq!(
            out,
            vec![
                RouteSegment::new(c(0, 0, 0), c(2, 0, 0)),
                RouteSegment::new(c(2, 0, 0), c(2, 0, 1)),
                RouteSegment::new(c(2, 0, 1), c(2, 2, 1)),
                RouteSegment::new(c(2, 2, 1), c(2, 2, 0)),
            ]
        );
        assert!(out.iter().all(|s| s.is_well_formed()));
    }

    #[test]
    fn multi_layer_via_is_one_segment() {
        let path = [c(0, 0, 0), c(0, 0, 2), c(1, 0, 2)];
        let mut out = Vec::new();
        path_to_segments(&path, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], RouteSegment::new(c(0, 0, 0), c(0, 0, 2)));
    }

    #[test]
    fn doubling_back_keeps_both_legs() {
        let path = [c(0, 0, 0), c(1, 0, 0), c(2, 0, 0), c(1, 0, 0), c(1, 1, 0)];
        let mut out = Vec::new();
        path_to_segments(&path, &mut out);
        assert_eq!(
            out,
            vec![
                RouteSegment::new(c(0, 0, 0), c(2, 0, 0)),
                RouteSegment::new(c(2, 0, 0), c(1, 0, 0)),
                RouteSegment::new(c(1, 0, 0), c(1, 1, 0)),
            ]
        );
        let wl: u32 = out.iter().map(|s| s.length()).sum();
        assert_eq!(wl, 4);

        let vias = [c(0, 0, 0), c(0, 0, 2), c(0, 0, 1)];
        let mut out = Vec::new();
        path_to_segments(&vias, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn stacks_become_vias() {
        let layout = NetLayout {
            paths: vec![vec![c(0, 0, 0), c(1, 0, 0)]],
            stacks: vec![(1, 0, LayerSpan { bot: 0, top: 3 })],
        };
        let segs = layout_to_segments(&layout);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1], RouteSegment::new(c(1, 0, 0), c(1, 0, 3)));
    }
}
