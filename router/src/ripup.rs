use crate::grid::EdgeModel;
use crate::tree::StTree;
use grt_common::db::indices::EdgeId;
use grt_common::geom::coord::GridCoord;

/// Removes the routed usage of a tree edge and clears its route. An unrouted edge is
/// left alone, so repeated calls are harmless. Returns whether anything was removed.
pub fn ripup(tree: &mut StTree, e: EdgeId, edges: &mut EdgeModel) -> bool {
    if tree.edges[e.index()].route.is_empty() {
        return false;
    }
    let (a, b) = (tree.edges[e.index()].n1, tree.edges[e.index()].n2);
    let span = tree.pos(a).manhattan(&tree.pos(b));
    let edge = &mut tree.edges[e.index()];
    let route = std::mem::take(&mut edge.route);
    edge.len = span;
    edges.add_route_usage(&route, -1);
    true
}

/// A routed edge longer than `mazeedge_threshold` that crosses a grid edge whose usage
/// exceeds its capacity by more than `ripup_threshold`.
pub fn is_ripup_candidate(
    tree: &StTree,
    e: EdgeId,
    edges: &EdgeModel,
    ripup_threshold: i32,
    mazeedge_threshold: u32,
) -> bool {
    let edge = &tree.edges[e.index()];
    if edge.len <= mazeedge_threshold || edge.route.len() < 2 {
        return false;
    }
    edge.route.windows(2).any(|w| {
        edges
            .edge_between(w[0], w[1])
            .is_some_and(|(dir, idx)| edges.is_congested(dir, idx, ripup_threshold))
    })
}

/// Rips `e` up if it is a rip-up candidate and hands back the removed route, so a
/// failed reroute can put it back.
pub fn ripup_check(
    tree: &mut StTree,
    e: EdgeId,
    edges: &mut EdgeModel,
    ripup_threshold: i32,
    mazeedge_threshold: u32,
) -> Option<Vec<GridCoord>> {
    if !is_ripup_candidate(tree, e, edges, ripup_threshold, mazeedge_threshold) {
        return None;
    }
    let saved = tree.edges[e.index()].route.clone();
    ripup(tree, e, edges).then_some(saved)
}
