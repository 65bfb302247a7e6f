//! Graph Cache (Component D): arena-backed interning of supernodes
//! (maximal unbranching node chains), with path records as small owned
//! vectors of supernode ids rather than raw pointers.
//!
//! Supernodes are interned strictly by their entry `DbNode` (exact key +
//! orientation match) — no attempt is made to recognise that two entry
//! points land mid-way through the same underlying chain. This trades a
//! little duplicate storage for a much simpler cache.

use rustc_hash::FxHashMap;

use crate::graph::{DeBruijnGraph, UNION_COLOUR};
use crate::types::DbNode;

pub type SnodeId = u32;
pub type PathId = u32;

struct SnodeRecord {
    nodes: Vec<DbNode>,
}

/// A recorded path: a sequence of interned supernode ids, walked in
/// order.
#[derive(Clone, Default)]
pub struct GCachePath {
    pub steps: Vec<SnodeId>,
}

/// One or more colours that, within a single crawl, happened to walk the
/// identical step sequence.
#[derive(Clone)]
pub struct MultiColPath {
    pub path: PathId,
    pub cols: Vec<usize>,
}

pub struct GraphCache {
    snodes: Vec<SnodeRecord>,
    snode_index: FxHashMap<DbNode, SnodeId>,
    paths: Vec<GCachePath>,
}

impl GraphCache {
    pub fn new() -> Self {
        GraphCache { snodes: Vec::new(), snode_index: FxHashMap::default(), paths: Vec::new() }
    }

    pub fn new_path(&mut self) -> PathId {
        self.paths.push(GCachePath::default());
        (self.paths.len() - 1) as PathId
    }

    /// Clone an existing path's recorded steps into a fresh path — used
    /// when the crawler must explore multiple branches from the same
    /// prefix.
    pub fn fork_path(&mut self, path: PathId) -> PathId {
        let steps = self.paths[path as usize].steps.clone();
        self.paths.push(GCachePath { steps });
        (self.paths.len() - 1) as PathId
    }

    /// Intern the supernode entered at `entry`, building it by walking
    /// the union-colour edge set forward until a branch, merge, or dead
    /// end. Returns the cached id if this exact entry was seen before.
    pub fn intern_supernode(&mut self, graph: &dyn DeBruijnGraph, entry: DbNode) -> SnodeId {
        if let Some(&id) = self.snode_index.get(&entry) {
            return id;
        }
        let nodes = linear_extend(graph, entry);
        let id = self.snodes.len() as SnodeId;
        self.snodes.push(SnodeRecord { nodes });
        self.snode_index.insert(entry, id);
        id
    }

    pub fn push_step(&mut self, path: PathId, snode: SnodeId) {
        self.paths[path as usize].steps.push(snode);
    }

    pub fn snode_nodes(&self, id: SnodeId) -> &[DbNode] {
        &self.snodes[id as usize].nodes
    }

    pub fn path_steps(&self, path: PathId) -> &[SnodeId] {
        &self.paths[path as usize].steps
    }

    pub fn path_num_nodes(&self, path: PathId) -> usize {
        self.path_steps(path).iter().map(|&s| self.snode_nodes(s).len()).sum()
    }

    /// Flatten a path's steps into its full node chain.
    pub fn path_nodes(&self, path: PathId) -> Vec<DbNode> {
        self.path_steps(path).iter().flat_map(|&s| self.snode_nodes(s).iter().copied()).collect()
    }

    /// The node chain of only the most recently pushed step.
    pub fn last_step_nodes(&self, path: PathId) -> &[DbNode] {
        let steps = self.path_steps(path);
        let last = *steps.last().expect("path has at least one step");
        self.snode_nodes(last)
    }

    pub fn entry_node(&self, snode: SnodeId) -> DbNode {
        self.snodes[snode as usize].nodes[0]
    }

    pub fn exit_node(&self, snode: SnodeId) -> DbNode {
        *self.snodes[snode as usize].nodes.last().expect("supernode is never empty")
    }

    /// Group a set of per-colour paths into `MultiColPath`s by exact
    /// equality of their step sequence.
    pub fn merge_by_equality(&self, per_colour_paths: &[(usize, PathId)]) -> Vec<MultiColPath> {
        let mut groups: Vec<MultiColPath> = Vec::new();
        for &(colour, path) in per_colour_paths {
            let steps = self.path_steps(path);
            if let Some(g) = groups.iter_mut().find(|g| self.path_steps(g.path) == steps) {
                g.cols.push(colour);
            } else {
                groups.push(MultiColPath { path, cols: vec![colour] });
            }
        }
        groups
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk forward from `entry` along the union edge set while both the
/// current and next node have exactly one edge in the relevant
/// direction (the standard supernode/unitig definition). The node that
/// breaks the chain (branch, merge, or dead end) is included as the
/// last node of the chain.
fn linear_extend(graph: &dyn DeBruijnGraph, entry: DbNode) -> Vec<DbNode> {
    let mut nodes = vec![entry];
    let mut cur = entry;
    loop {
        let e = graph.edges(cur.key, UNION_COLOUR);
        if e.out_degree(cur.orient) != 1 {
            break;
        }
        let nexts = graph.next_nodes(cur, e);
        let (next, _base) = match nexts.first() {
            Some(&n) => n,
            None => break,
        };
        if next == entry {
            // closed a simple cycle back to the entry point
            break;
        }
        let e_next = graph.edges(next.key, UNION_COLOUR);
        if e_next.out_degree(next.orient.flip()) != 1 {
            nodes.push(next);
            break;
        }
        nodes.push(next);
        cur = next;
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemGraph;

    #[test]
    fn intern_is_idempotent_for_same_entry() {
        let mut g = MemGraph::new(4, 1);
        g.add_sequence(0, b"ACGTACGTT");
        let mut cache = GraphCache::new();
        let entry = g.find(b"ACGT").unwrap();
        let id1 = cache.intern_supernode(&g, entry);
        let id2 = cache.intern_supernode(&g, entry);
        assert_eq!(id1, id2);
    }

    #[test]
    fn fork_path_clones_steps_independently() {
        let mut g = MemGraph::new(4, 1);
        g.add_sequence(0, b"ACGTACGTT");
        let mut cache = GraphCache::new();
        let entry = g.find(b"ACGT").unwrap();
        let snode = cache.intern_supernode(&g, entry);

        let p0 = cache.new_path();
        cache.push_step(p0, snode);
        let p1 = cache.fork_path(p0);
        cache.push_step(p1, snode);

        assert_eq!(cache.path_steps(p0).len(), 1);
        assert_eq!(cache.path_steps(p1).len(), 2);
    }

    #[test]
    fn merge_by_equality_groups_identical_step_sequences() {
        let mut g = MemGraph::new(4, 1);
        g.add_sequence(0, b"ACGTACGTT");
        let mut cache = GraphCache::new();
        let entry = g.find(b"ACGT").unwrap();
        let snode = cache.intern_supernode(&g, entry);

        let p0 = cache.new_path();
        cache.push_step(p0, snode);
        let p1 = cache.new_path();
        cache.push_step(p1, snode);

        let groups = cache.merge_by_equality(&[(0, p0), (1, p1)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].cols, vec![0, 1]);
    }

    #[test]
    fn path_num_nodes_sums_supernode_lengths() {
        let mut g = MemGraph::new(4, 1);
        g.add_sequence(0, b"ACGTACGTTGCA");
        let mut cache = GraphCache::new();
        let entry = g.find(b"ACGT").unwrap();
        let snode = cache.intern_supernode(&g, entry);
        let p0 = cache.new_path();
        cache.push_step(p0, snode);
        assert_eq!(cache.path_num_nodes(p0), cache.snode_nodes(snode).len());
    }
}
