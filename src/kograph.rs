//! KOGraph (Component C): an index of where graph k-mers occur in a set
//! of reference sequences, plus online "run" extension that tracks
//! maximal co-linear stretches of graph <-> reference agreement as a
//! walk proceeds.

use rustc_hash::FxHashMap;

use crate::graph::DeBruijnGraph;
use crate::kmer::PackedKmer;
use crate::types::{DbNode, HKey, KOccurRun, Orientation, ReferenceOccurrence, Strand};

/// CSR-style index: `offsets[key]..offsets[key+1]` is the slice of
/// `flat` holding that key's reference occurrences.
pub struct KoGraph {
    offsets: FxHashMap<HKey, (u32, u32)>,
    flat: Vec<ReferenceOccurrence>,
    pub chrom_names: Vec<String>,
}

impl KoGraph {
    /// Build the index from a set of named reference sequences. Every
    /// valid k-mer window is looked up in `graph`; windows containing an
    /// `N` (graph lookup returns None for kmers not present) are simply
    /// skipped, logged at debug level by the caller.
    pub fn build(graph: &dyn DeBruijnGraph, refs: &[(String, Vec<u8>)]) -> Self {
        let k = graph.kmer_size();
        let mut grouped: FxHashMap<HKey, Vec<ReferenceOccurrence>> = FxHashMap::default();
        let mut chrom_names = Vec::with_capacity(refs.len());

        for (chrom_idx, (name, seq)) in refs.iter().enumerate() {
            chrom_names.push(name.clone());
            if seq.len() < k {
                continue;
            }
            for i in 0..=seq.len() - k {
                let window = &seq[i..i + k];
                let packed = match PackedKmer::pack(window) {
                    Some(p) => p,
                    None => {
                        log::debug!("kograph: skipping window with non-ACGT base at {}:{}", name, i);
                        continue;
                    }
                };
                let (_, orient) = packed.canonical(k);
                if let Some(node) = graph.find(window) {
                    let strand = match orient {
                        Orientation::Forward => Strand::Plus,
                        Orientation::Reverse => Strand::Minus,
                    };
                    grouped.entry(node.key).or_default().push(ReferenceOccurrence {
                        chrom: chrom_idx as u32,
                        offset: i as u32,
                        strand,
                    });
                }
            }
        }

        let mut offsets = FxHashMap::default();
        let mut flat = Vec::new();
        for (key, occs) in grouped {
            let start = flat.len() as u32;
            flat.extend(occs);
            offsets.insert(key, (start, flat.len() as u32));
        }

        KoGraph { offsets, flat, chrom_names }
    }

    pub fn occurrences(&self, key: HKey) -> &[ReferenceOccurrence] {
        match self.offsets.get(&key) {
            Some(&(s, e)) => &self.flat[s as usize..e as usize],
            None => &[],
        }
    }

    /// Extend a set of open runs and a set of ended runs by one walked
    /// node. `qoffset_base + local_index` becomes the `qoffset` recorded
    /// for any run seeded at this node. `forward` indicates the walk
    /// direction (true = node steps increase reference offset on the
    /// Plus strand).
    ///
    /// This is called once per node for the 5' flank (a single batch
    /// over the whole flank, `qoffset_base = 0`) and once per newly
    /// explored supernode during the 3' crawl (`qoffset_base` = the
    /// absolute node offset where that supernode begins in the path).
    pub fn extend(
        &self,
        nodes: &[DbNode],
        forward: bool,
        qoffset_base: usize,
        open: &mut Vec<KOccurRun>,
        ended: &mut Vec<KOccurRun>,
    ) {
        for (i, &node) in nodes.iter().enumerate() {
            let qoffset = qoffset_base + i;
            let occs = self.occurrences(node.key);

            // Effective strand: flip the stored strand if the node is
            // walked in reverse orientation.
            let mut matched: Vec<usize> = Vec::new();
            for (oi, occ) in occs.iter().enumerate() {
                let effective_strand = match node.orient {
                    Orientation::Forward => occ.strand,
                    Orientation::Reverse => occ.strand.flip(),
                };
                let extends_open = open.iter().position(|run| {
                    run.chrom == occ.chrom
                        && run.strand == effective_strand
                        && run.qoffset + 1 == qoffset
                        && expected_next(run, forward) == occ.offset as i64
                });
                if let Some(idx) = extends_open {
                    open[idx].last = occ.offset as i64;
                    open[idx].qoffset = qoffset;
                    matched.push(oi);
                }
            }

            // Any open run not extended this step has ended.
            let mut still_open = Vec::with_capacity(open.len());
            for run in open.drain(..) {
                if run.qoffset == qoffset {
                    still_open.push(run);
                } else {
                    ended.push(run);
                }
            }
            *open = still_open;

            // Seed a fresh run for every occurrence not used to extend
            // an existing one.
            for (oi, occ) in occs.iter().enumerate() {
                if matched.contains(&oi) {
                    continue;
                }
                let effective_strand = match node.orient {
                    Orientation::Forward => occ.strand,
                    Orientation::Reverse => occ.strand.flip(),
                };
                open.push(KOccurRun {
                    first: occ.offset as i64,
                    last: occ.offset as i64,
                    strand: effective_strand,
                    qoffset,
                    chrom: occ.chrom,
                });
            }
        }
    }

    /// Drain the remaining open runs into `ended` (call once a walk
    /// segment is finished being scanned).
    pub fn flush(open: &mut Vec<KOccurRun>, ended: &mut Vec<KOccurRun>) {
        ended.extend(open.drain(..));
    }
}

/// The reference offset a run would need to see next to stay co-linear.
#[inline]
fn expected_next(run: &KOccurRun, forward: bool) -> i64 {
    match (run.strand, forward) {
        (Strand::Plus, true) => run.last + 1,
        (Strand::Plus, false) => run.last - 1,
        (Strand::Minus, true) => run.last - 1,
        (Strand::Minus, false) => run.last + 1,
    }
}

/// Keep only runs covering at least `min_nkmers` k-mers.
pub fn filter_min_len(runs: &[KOccurRun], min_nkmers: usize) -> Vec<KOccurRun> {
    runs.iter().filter(|r| r.len() >= min_nkmers).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemGraph;

    fn graph_with_ref() -> (MemGraph, Vec<(String, Vec<u8>)>) {
        let mut g = MemGraph::new(4, 1);
        let seq = b"ACGTACGTTGCA".to_vec();
        g.add_sequence(0, &seq);
        (g, vec![("chr1".to_string(), seq)])
    }

    #[test]
    fn build_indexes_every_window() {
        let (g, refs) = graph_with_ref();
        let ko = KoGraph::build(&g, &refs);
        let node = g.find(b"ACGT").unwrap();
        assert!(!ko.occurrences(node.key).is_empty());
    }

    #[test]
    fn extend_grows_colinear_run_forward() {
        let (g, refs) = graph_with_ref();
        let ko = KoGraph::build(&g, &refs);

        // Walk the reference forward: ACGT, CGTA, GTAC, TACG
        let path: Vec<DbNode> = [b"ACGT".as_slice(), b"CGTA", b"GTAC", b"TACG"]
            .iter()
            .map(|w| g.find(w).unwrap())
            .collect();

        let mut open = Vec::new();
        let mut ended = Vec::new();
        ko.extend(&path, true, 0, &mut open, &mut ended);
        KoGraph::flush(&mut open, &mut ended);

        let longest = ended.iter().map(|r| r.len()).max().unwrap_or(0);
        assert!(longest >= 4, "expected a run spanning the whole walked flank, got {}", longest);
    }

    #[test]
    fn filter_min_len_drops_short_runs() {
        let runs = vec![
            KOccurRun { first: 0, last: 1, strand: Strand::Plus, qoffset: 0, chrom: 0 },
            KOccurRun { first: 0, last: 10, strand: Strand::Plus, qoffset: 0, chrom: 0 },
        ];
        let filtered = filter_min_len(&runs, 5);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].len(), 11);
    }
}
