//! Graph Crawler (Component E): bounded, per-colour traversal away from a
//! node, one supernode at a time, gated by caller-supplied
//! `continue_cb`/`finish_cb` hooks. Colours that walk an identical step
//! sequence are merged into a single `MultiColPath`.

use crate::cache::{GraphCache, MultiColPath, PathId};
use crate::graph::{slot, DeBruijnGraph, PathOracle, UNION_COLOUR};
use crate::types::DbNode;

/// Explore every admissible branch out of `from`, across the real
/// colours in `cols`, extending one supernode at a time while
/// `continue_cb` returns true. `finish_cb` runs once per raw path when
/// it stops (continue_cb false, dead end, or no admissible colours
/// remain). `fork_cb` runs once per child path created when colours
/// diverge mid-walk, `(parent, child)`, letting a caller that tracks its
/// own per-path bookkeeping (alongside the cache's own steps) carry it
/// forward into every branch rather than losing it at the fork. Returns
/// colour groups merged by identical step sequence.
pub fn fetch(
    cache: &mut GraphCache,
    graph: &dyn DeBruijnGraph,
    oracle: &dyn PathOracle,
    from: DbNode,
    cols: &[usize],
    mut continue_cb: impl FnMut(&GraphCache, PathId) -> bool,
    mut finish_cb: impl FnMut(&GraphCache, PathId),
    mut fork_cb: impl FnMut(&GraphCache, PathId, PathId),
) -> Vec<MultiColPath> {
    let mut results = Vec::new();
    if cols.is_empty() {
        return results;
    }

    let edges_union = graph.edges(from.key, UNION_COLOUR);
    let candidates = graph.next_nodes(from, edges_union);
    if candidates.is_empty() {
        return results;
    }

    let by_branch = route_colours(graph, oracle, from, cols, &candidates);

    for (b, branch_cols) in by_branch.into_iter().enumerate() {
        if branch_cols.is_empty() {
            continue;
        }
        let entry = candidates[b].0;
        let path = cache.new_path();
        extend_branch(
            cache,
            graph,
            oracle,
            entry,
            path,
            branch_cols,
            &mut continue_cb,
            &mut finish_cb,
            &mut fork_cb,
            &mut results,
        );
    }

    let flat: Vec<(usize, PathId)> =
        results.iter().flat_map(|g| g.cols.iter().map(move |&c| (c, g.path))).collect();
    cache.merge_by_equality(&flat)
}

/// Route each colour in `cols` to the first candidate successor it is
/// admissible for (edge present in that colour, and not forbidden by the
/// oracle). A colour with no admissible successor is simply dropped —
/// the caller sees it missing from every returned group.
fn route_colours(
    graph: &dyn DeBruijnGraph,
    oracle: &dyn PathOracle,
    from: DbNode,
    cols: &[usize],
    candidates: &[(DbNode, u8)],
) -> Vec<Vec<usize>> {
    let mut by_branch: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
    for &c in cols {
        let edges_c = graph.edges(from.key, slot(c));
        let allowed = oracle.allowed_bases(from, c);
        for (i, &(_, base)) in candidates.iter().enumerate() {
            if !edges_c.has_base(from.orient, base) {
                continue;
            }
            if let Some(bases) = &allowed {
                if !bases.contains(&base) {
                    continue;
                }
            }
            by_branch[i].push(c);
            break;
        }
    }
    by_branch
}

#[allow(clippy::too_many_arguments)]
fn extend_branch(
    cache: &mut GraphCache,
    graph: &dyn DeBruijnGraph,
    oracle: &dyn PathOracle,
    entry: DbNode,
    path: PathId,
    cols: Vec<usize>,
    continue_cb: &mut dyn FnMut(&GraphCache, PathId) -> bool,
    finish_cb: &mut dyn FnMut(&GraphCache, PathId),
    fork_cb: &mut dyn FnMut(&GraphCache, PathId, PathId),
    results: &mut Vec<MultiColPath>,
) {
    let snode = cache.intern_supernode(graph, entry);
    cache.push_step(path, snode);

    if !continue_cb(cache, path) {
        finish_cb(cache, path);
        results.push(MultiColPath { path, cols });
        return;
    }

    let exit = cache.exit_node(snode);
    let edges_union = graph.edges(exit.key, UNION_COLOUR);
    let candidates = graph.next_nodes(exit, edges_union);
    if candidates.is_empty() {
        finish_cb(cache, path);
        results.push(MultiColPath { path, cols });
        return;
    }

    let by_branch = route_colours(graph, oracle, exit, &cols, &candidates);
    let dead: Vec<usize> =
        cols.into_iter().filter(|c| !by_branch.iter().any(|b| b.contains(c))).collect();
    let live_groups: Vec<(usize, Vec<usize>)> =
        by_branch.into_iter().enumerate().filter(|(_, v)| !v.is_empty()).collect();

    if dead.is_empty() && live_groups.len() == 1 {
        let (b, branch_cols) = live_groups.into_iter().next().unwrap();
        let branch_entry = candidates[b].0;
        extend_branch(cache, graph, oracle, branch_entry, path, branch_cols, continue_cb, finish_cb, fork_cb, results);
        return;
    }

    // Fork every live branch off `path` while its accumulated per-path
    // state (whatever `fork_cb` tracks on the caller's behalf) is still
    // intact, before `finish_cb` below consumes it for the dead remainder.
    for (b, branch_cols) in live_groups {
        let branch_entry = candidates[b].0;
        let branch_path = cache.fork_path(path);
        fork_cb(cache, path, branch_path);
        extend_branch(cache, graph, oracle, branch_entry, branch_path, branch_cols, continue_cb, finish_cb, fork_cb, results);
    }

    if !dead.is_empty() {
        finish_cb(cache, path);
        results.push(MultiColPath { path, cols: dead });
    }
}
