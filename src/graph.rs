//! Graph accessor trait (Component B) and a minimal in-memory
//! implementation used by tests and the CLI.

use std::collections::HashMap;

use rustc_hash::FxHashMap;

use crate::kmer::{encode_base, PackedKmer};
use crate::types::{DbNode, Edges, HKey, Orientation};

/// Colour slot `0` is the union/OR pseudo-colour used for topology and
/// fork detection; real sample colours are numbered `1..=num_colours()`.
pub const UNION_COLOUR: usize = 0;

/// Map a real, 0-based sample colour index to its internal slot number.
#[inline]
pub fn slot(colour: usize) -> usize {
    colour + 1
}

/// Accessor over a coloured de Bruijn graph.
///
/// Implementations own the actual node storage (hash table, on-disk
/// mmap, whatever); the engine never constructs nodes itself, only
/// walks them through this trait.
pub trait DeBruijnGraph {
    fn num_nodes(&self) -> usize;
    /// Number of real sample colours (excludes the union pseudo-colour).
    fn num_colours(&self) -> usize;
    fn kmer_size(&self) -> usize;

    /// Outgoing edges for a node's key in a given colour. Colour
    /// `UNION_COLOUR` returns the OR of all real colours' edges.
    fn edges(&self, key: HKey, colour: usize) -> Edges;

    /// The node's stored canonical packed k-mer.
    fn bkmer(&self, key: HKey) -> PackedKmer;

    /// Whether `key` is present in the given colour slot (`UNION_COLOUR`
    /// or `slot(real_colour)`).
    fn in_colour(&self, key: HKey, colour: usize) -> bool;

    /// Enumerate the (at most 4) successor nodes of `node` given its
    /// edge set, returning the node and the base code that was
    /// traversed to reach it.
    fn next_nodes(&self, node: DbNode, edges: Edges) -> Vec<(DbNode, u8)>;

    /// Look up the node (if any) for a raw k-mer sequence, canonicalising
    /// it first.
    fn find(&self, seq: &[u8]) -> Option<DbNode>;

    /// Visit every node whose key falls in this thread's partition of an
    /// `nthreads`-way disjoint split (`key % nthreads == thread_id`).
    fn iterate_partition(&self, thread_id: usize, nthreads: usize, f: &mut dyn FnMut(HKey));
}

/// Link/path annotation oracle (Component external collaborator).
/// `allowed_bases` restricts which outgoing bases are admissible for a
/// colour at a node; `None` means unrestricted.
pub trait PathOracle {
    fn allowed_bases(&self, node: DbNode, colour: usize) -> Option<Vec<u8>>;
}

/// An oracle with no path restrictions at all.
pub struct NoOracle;

impl PathOracle for NoOracle {
    fn allowed_bases(&self, _node: DbNode, _colour: usize) -> Option<Vec<u8>> {
        None
    }
}

/// Minimal in-memory graph: one colour per input sequence set, built by
/// extracting every overlapping k-mer window. Edges record transitions
/// actually observed in the input, split per real colour plus a
/// precomputed union.
struct NodeRecord {
    bkmer: PackedKmer,
    /// edges[0] = union, edges[1..=num_colours] = per-colour
    edges: Vec<Edges>,
    colour_present: Vec<bool>,
}

pub struct MemGraph {
    kmer_size: usize,
    num_colours: usize,
    keys: FxHashMap<PackedKmer, HKey>,
    nodes: Vec<NodeRecord>,
}

impl MemGraph {
    pub fn new(kmer_size: usize, num_colours: usize) -> Self {
        MemGraph { kmer_size, num_colours, keys: FxHashMap::default(), nodes: Vec::new() }
    }

    fn intern(&mut self, packed: PackedKmer) -> HKey {
        let (canon, _) = packed.canonical(self.kmer_size);
        if let Some(&k) = self.keys.get(&canon) {
            return k;
        }
        let key = self.nodes.len() as HKey;
        self.nodes.push(NodeRecord {
            bkmer: canon,
            edges: vec![Edges::default(); self.num_colours + 1],
            colour_present: vec![false; self.num_colours + 1],
        });
        self.keys.insert(canon, key);
        key
    }

    /// Load a sequence into colour `colour` (0-based real colour index,
    /// i.e. stored at internal slot `colour + 1`). Every valid (all
    /// A/C/G/T) window of length `kmer_size` is added; a run broken by
    /// an `N` simply skips the affected windows.
    pub fn add_sequence(&mut self, colour: usize, seq: &[u8]) {
        assert!(colour < self.num_colours, "colour out of range");
        let k = self.kmer_size;
        if seq.len() < k {
            return;
        }
        let slot = colour + 1;

        let mut windows: Vec<(usize, PackedKmer, Orientation)> = Vec::new();
        let mut i = 0;
        while i + k <= seq.len() {
            match PackedKmer::pack(&seq[i..i + k]) {
                Some(packed) => {
                    let (canon, orient) = packed.canonical(k);
                    windows.push((i, canon, orient));
                    i += 1;
                }
                None => {
                    // skip past the offending base
                    let bad = (i..i + k)
                        .find(|&j| encode_base(seq[j]).is_none())
                        .unwrap_or(i);
                    i = bad + 1;
                }
            }
        }

        let mut keyed: Vec<HKey> = Vec::with_capacity(windows.len());
        for &(_, canon, _) in &windows {
            keyed.push(self.intern(canon));
        }
        for key in &keyed {
            self.nodes[*key as usize].colour_present[slot] = true;
            self.nodes[*key as usize].colour_present[UNION_COLOUR] = true;
        }

        for w in 0..keyed.len().saturating_sub(1) {
            let (_, _, orient_a) = windows[w];
            let (_, _, orient_b) = windows[w + 1];
            let a = keyed[w];
            let b = keyed[w + 1];
            let next_base_code = encode_base(seq[w + k]).expect("validated window");

            // Edge out of `a` in the direction the walk is proceeding.
            let a_effective_orient = orient_a;
            self.nodes[a as usize].edges[slot].set_base(a_effective_orient, next_base_code);
            self.nodes[a as usize].edges[UNION_COLOUR].set_base(a_effective_orient, next_base_code);

            // Reciprocal edge into `b` from the other direction.
            let prev_base_code = encode_base(seq[w]).expect("validated window");
            let b_effective_orient = orient_b.flip();
            self.nodes[b as usize].edges[slot]
                .set_base(b_effective_orient, complement_for_reverse(prev_base_code, orient_b));
            self.nodes[b as usize].edges[UNION_COLOUR]
                .set_base(b_effective_orient, complement_for_reverse(prev_base_code, orient_b));
        }
    }
}

/// The base recorded for the reciprocal (incoming) edge must be expressed
/// in `b`'s own canonical coordinate system: if `b` was stored reverse,
/// the incoming base is the complement of the base actually read.
fn complement_for_reverse(base_code: u8, orient: Orientation) -> u8 {
    match orient {
        Orientation::Forward => base_code,
        Orientation::Reverse => 3 - base_code,
    }
}

impl DeBruijnGraph for MemGraph {
    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn num_colours(&self) -> usize {
        self.num_colours
    }

    fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    fn edges(&self, key: HKey, colour: usize) -> Edges {
        self.nodes[key as usize].edges[colour]
    }

    fn bkmer(&self, key: HKey) -> PackedKmer {
        self.nodes[key as usize].bkmer
    }

    fn in_colour(&self, key: HKey, colour: usize) -> bool {
        self.nodes[key as usize].colour_present[colour]
    }

    fn next_nodes(&self, node: DbNode, edges: Edges) -> Vec<(DbNode, u8)> {
        let mut out = Vec::with_capacity(4);
        for base in 0u8..4 {
            if !edges.has_base(node.orient, base) {
                continue;
            }
            let cur = self.bkmer(node.key).canonical(self.kmer_size).0;
            let cur_effective = match node.orient {
                Orientation::Forward => cur,
                Orientation::Reverse => cur.revcomp(self.kmer_size),
            };
            let shifted = cur_effective.shift(self.kmer_size, base);
            let (canon, orient) = shifted.canonical(self.kmer_size);
            if let Some(&key) = self.keys.get(&canon) {
                out.push((DbNode::new(key, orient), base));
            }
        }
        out
    }

    fn find(&self, seq: &[u8]) -> Option<DbNode> {
        let packed = PackedKmer::pack(seq)?;
        let (canon, orient) = packed.canonical(self.kmer_size);
        self.keys.get(&canon).map(|&key| DbNode::new(key, orient))
    }

    fn iterate_partition(&self, thread_id: usize, nthreads: usize, f: &mut dyn FnMut(HKey)) {
        for key in 0..self.nodes.len() as HKey {
            if (key as usize) % nthreads == thread_id {
                f(key);
            }
        }
    }
}

/// Tracks, per thread, how many nodes fell into its partition. Used for
/// the startup debug-level diagnostics (`debug!` per-thread partition
/// size).
pub fn partition_sizes(graph: &dyn DeBruijnGraph, nthreads: usize) -> HashMap<usize, usize> {
    let mut sizes = HashMap::new();
    for t in 0..nthreads {
        let mut count = 0usize;
        graph.iterate_partition(t, nthreads, &mut |_| count += 1);
        sizes.insert(t, count);
    }
    sizes
}
