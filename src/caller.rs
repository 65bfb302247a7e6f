//! Breakpoint Caller (Component F): the per-thread driver that finds
//! fork nodes, crawls a 5' reverse flank and a 3' forward flank away
//! from them, and emits a call whenever both sides re-anchor to the
//! reference.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::cache::{GraphCache, PathId};
use crate::graph::{slot, DeBruijnGraph, PathOracle, UNION_COLOUR};
use crate::kmer::node_chain_sequence;
use crate::kograph::{filter_min_len, KoGraph};
use crate::output;
use crate::crawler;
use crate::types::{BreakpointError, CallStats, Config, DbNode, KOccurRun, Orientation, RunMeta};

/// Drives a full breakpoint-calling pass over a graph.
pub struct BreakpointCaller<'a> {
    config: &'a Config,
    graph: &'a (dyn DeBruijnGraph + Sync),
    kograph: &'a KoGraph,
    oracle: &'a (dyn PathOracle + Sync),
}

impl<'a> BreakpointCaller<'a> {
    pub fn new(
        config: &'a Config,
        graph: &'a (dyn DeBruijnGraph + Sync),
        kograph: &'a KoGraph,
        oracle: &'a (dyn PathOracle + Sync),
    ) -> Self {
        BreakpointCaller { config, graph, kograph, oracle }
    }

    /// Run the calling pass, writing gzip-compressed calls to `out`.
    /// Spawns `config.num_of_threads` workers over a static stride
    /// partition of the graph's node keys, each owning a private
    /// `GraphCache` and sharing one output mutex and call-id counter.
    pub fn call<W: Write + Send>(&self, out: W, run_meta: &RunMeta) -> Result<CallStats, BreakpointError> {
        log::info!(
            "breakpoint calling: {} threads, min ref flank {} kmers ({} bp)",
            self.config.num_of_threads,
            self.config.min_ref_flank,
            self.config.min_ref_flank + self.config.kmer_size - 1
        );

        let out_mutex = Mutex::new(GzEncoder::new(out, Compression::default()));
        output::write_header(&mut *out_mutex.lock().expect("fresh mutex"), self.config, run_meta)?;

        let call_id_ctr = AtomicU64::new(0);
        let nthreads = self.config.num_of_threads.max(1);
        let errors: Mutex<Vec<BreakpointError>> = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for t in 0..nthreads {
                let out_ref = &out_mutex;
                let ctr_ref = &call_id_ctr;
                let errs_ref = &errors;
                scope.spawn(move || {
                    let mut cache = GraphCache::new();
                    let mut count = 0usize;
                    self.graph.iterate_partition(t, nthreads, &mut |key| {
                        count += 1;
                        for orient in [Orientation::Forward, Orientation::Reverse] {
                            let node = DbNode::new(key, orient);
                            if let Err(e) = self.process_fork_candidate(&mut cache, out_ref, ctr_ref, node) {
                                errs_ref.lock().expect("errors mutex").push(e);
                            }
                        }
                    });
                    log::debug!("thread {} scanned {} keys", t, count);
                });
            }
        });

        out_mutex
            .into_inner()
            .map_err(|_| BreakpointError::MutexPoisoned("output".to_string()))?
            .finish()?;

        if let Some(e) = errors.into_inner().expect("errors mutex").into_iter().next() {
            return Err(e);
        }

        let stats = CallStats { num_calls: call_id_ctr.load(Ordering::SeqCst) };
        log::info!("{} calls printed", stats.num_calls);
        Ok(stats)
    }

    fn process_fork_candidate<W: Write>(
        &self,
        cache: &mut GraphCache,
        out: &Mutex<GzEncoder<W>>,
        call_ctr: &AtomicU64,
        fork_node: DbNode,
    ) -> Result<(), BreakpointError> {
        let key = fork_node.key;
        let edges_union = self.graph.edges(key, UNION_COLOUR);
        if edges_union.out_degree(fork_node.orient) <= 1 {
            return Ok(());
        }

        let cols: Vec<usize> = (0..self.graph.num_colours())
            .filter(|&c| self.graph.edges(key, slot(c)).out_degree(fork_node.orient) == 1)
            .collect();
        if cols.is_empty() {
            return Ok(());
        }

        self.follow_break(cache, out, call_ctr, fork_node, &cols)
    }

    /// Build the 5' reverse flank (shared context before the fork), then
    /// for every colour-subset that shares a 5' corridor long enough to
    /// re-anchor, crawl forward from the fork looking for a 3'
    /// re-entry point.
    fn follow_break<W: Write>(
        &self,
        cache: &mut GraphCache,
        out: &Mutex<GzEncoder<W>>,
        call_ctr: &AtomicU64,
        fork_node: DbNode,
        cols: &[usize],
    ) -> Result<(), BreakpointError> {
        let rev_node = fork_node.reverse();
        let max_ref_flank = self.config.max_ref_flank;

        let flank5p_groups = crawler::fetch(
            cache,
            self.graph,
            self.oracle,
            rev_node,
            cols,
            |cache, path| cache.path_num_nodes(path) < max_ref_flank,
            |_cache, _path| {},
            |_cache, _parent, _child| {},
        );

        for g5 in &flank5p_groups {
            let raw_nodes = cache.path_nodes(g5.path);
            let flank5p_nodes: Vec<DbNode> = raw_nodes.iter().rev().map(|n| n.reverse()).collect();

            let mut open = Vec::new();
            let mut ended = Vec::new();
            self.kograph.extend(&flank5p_nodes, true, 0, &mut open, &mut ended);
            KoGraph::flush(&mut open, &mut ended);
            let flank5p_runs = filter_min_len(&ended, self.config.min_ref_flank);
            if flank5p_runs.is_empty() {
                log::debug!("5' flank at fork node {:?} has no reference anchor, discarding", fork_node);
                continue;
            }

            self.scan_3p(cache, out, call_ctr, fork_node, &g5.cols, &flank5p_nodes, &flank5p_runs)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_3p<W: Write>(
        &self,
        cache: &mut GraphCache,
        out: &Mutex<GzEncoder<W>>,
        call_ctr: &AtomicU64,
        fork_node: DbNode,
        cols: &[usize],
        flank5p_nodes: &[DbNode],
        flank5p_runs: &[KOccurRun],
    ) -> Result<(), BreakpointError> {
        let min_ref_flank = self.config.min_ref_flank;
        let max_ref_flank = self.config.max_ref_flank;
        let kograph = self.kograph;

        let mut live: HashMap<PathId, (Vec<KOccurRun>, Vec<KOccurRun>)> = HashMap::new();
        let mut finished: HashMap<PathId, Vec<KOccurRun>> = HashMap::new();

        let flank3p_groups = {
            let live_ref = &mut live;
            let finished_ref = &mut finished;
            crawler::fetch(
                cache,
                self.graph,
                self.oracle,
                fork_node,
                cols,
                |cache, path| {
                    let nodes = cache.last_step_nodes(path);
                    let before = cache.path_num_nodes(path) - nodes.len();
                    let entry = live_ref.entry(path).or_insert_with(|| (Vec::new(), Vec::new()));
                    kograph.extend(nodes, true, before, &mut entry.0, &mut entry.1);
                    let max_open = entry.0.iter().map(|r| r.len()).max().unwrap_or(0);
                    let reached =
                        entry.1.iter().any(|r| r.len() >= min_ref_flank) || max_open >= min_ref_flank;
                    let over_cap = cache.path_num_nodes(path) >= max_ref_flank;
                    !reached && !over_cap
                },
                |_cache, path| {
                    if let Some((open, ended)) = live_ref.remove(&path) {
                        let mut all = ended;
                        all.extend(open);
                        finished_ref.insert(path, filter_min_len(&all, min_ref_flank));
                    }
                },
                |_cache, parent, child| {
                    // A diverging colour must not lose runs that were open
                    // (or already ended) while this path was still shared:
                    // seed the forked child from the parent's state so a
                    // re-entry spanning the fork point is still detected.
                    if let Some(state) = live_ref.get(&parent).cloned() {
                        live_ref.insert(child, state);
                    }
                },
            )
        };

        for g3 in &flank3p_groups {
            let flank3p_runs = match finished.get(&g3.path) {
                Some(runs) if !runs.is_empty() => runs.clone(),
                _ => {
                    log::debug!(
                        "3' crawl from fork node {:?} hit the traversal limit without re-entering the reference",
                        fork_node
                    );
                    continue;
                }
            };
            let full_nodes = cache.path_nodes(g3.path);
            self.emit_call(out, call_ctr, flank5p_nodes, flank5p_runs, &full_nodes, &flank3p_runs, &g3.cols)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_call<W: Write>(
        &self,
        out: &Mutex<GzEncoder<W>>,
        call_ctr: &AtomicU64,
        flank5p_nodes: &[DbNode],
        flank5p_runs: &[KOccurRun],
        full_nodes: &[DbNode],
        flank3p_runs: &[KOccurRun],
        cols: &[usize],
    ) -> Result<(), BreakpointError> {
        let mut sorted = flank3p_runs.to_vec();
        sorted.sort_by_key(|r| r.qoffset);
        let reentry = sorted[0].qoffset;
        let kmer_size = self.graph.kmer_size();
        let shift3p = (kmer_size.saturating_sub(1)).min(reentry);
        let split = (reentry - shift3p).min(full_nodes.len());

        let path_nodes = &full_nodes[..split];
        let flank3p_nodes = &full_nodes[split..];

        let bkmer_of = |n: DbNode| self.graph.bkmer(n.key);
        let path_seq = node_chain_sequence(path_nodes, kmer_size, bkmer_of);
        let flank5p_seq = node_chain_sequence(flank5p_nodes, kmer_size, bkmer_of);
        let flank3p_seq = node_chain_sequence(flank3p_nodes, kmer_size, bkmer_of);

        let rebased: Vec<KOccurRun> = sorted
            .iter()
            .map(|r| {
                let mut r2 = *r;
                r2.qoffset = r.qoffset.saturating_sub(reentry);
                r2
            })
            .collect();

        let call_id = call_ctr.fetch_add(1, Ordering::SeqCst);
        let mut guard = out.lock().map_err(|_| BreakpointError::MutexPoisoned("output".to_string()))?;
        output::write_call(
            &mut *guard,
            call_id,
            kmer_size,
            self.kograph,
            &flank5p_seq,
            flank5p_runs,
            &flank3p_seq,
            &rebased,
            &path_seq,
            cols,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MemGraph, NoOracle};

    #[test]
    fn clean_deletion_produces_one_call() {
        // Reference: a long backbone. Sample: same backbone but with a
        // chunk of extra (non-reference) sequence spliced in, which
        // must diverge then rejoin.
        let reference = b"ACGTACGTTGCATGCATGCACCGGTTAACC".to_vec();
        let mut g = MemGraph::new(5, 1);
        g.add_sequence(0, &reference);

        let kograph = KoGraph::build(&g, &[("chr1".to_string(), reference.clone())]);
        let config = Config {
            num_of_threads: 1,
            min_ref_flank: 3,
            max_ref_flank: 100,
            kmer_size: 5,
            seq_paths: vec!["chr1.fa".to_string()],
        };
        let caller = BreakpointCaller::new(&config, &g, &kograph, &NoOracle);

        let mut out = Vec::new();
        let run_meta = RunMeta { cmdline: "test".to_string(), wkdir: None, file_date: "19700101".to_string() };
        let stats = caller.call(&mut out, &run_meta).unwrap();
        // A purely linear reference-only graph has no forks: zero calls.
        assert_eq!(stats.num_calls, 0);
    }

    #[test]
    fn diverging_sample_yields_a_call() {
        let reference = b"ACGTACGTTGCATGCATGCACCGGTTAACCGGA".to_vec();
        let mut variant = reference.clone();
        // splice a short insertion into the middle, creating a fork
        // away from the reference backbone and a later re-join.
        variant.splice(15..15, b"TTTTT".iter().copied());

        let mut g = MemGraph::new(5, 2);
        g.add_sequence(0, &reference);
        g.add_sequence(1, &variant);

        let kograph = KoGraph::build(&g, &[("chr1".to_string(), reference.clone())]);
        let config = Config {
            num_of_threads: 1,
            min_ref_flank: 3,
            max_ref_flank: 200,
            kmer_size: 5,
            seq_paths: vec!["chr1.fa".to_string()],
        };
        let caller = BreakpointCaller::new(&config, &g, &kograph, &NoOracle);

        let mut out = Vec::new();
        let run_meta = RunMeta { cmdline: "test".to_string(), wkdir: None, file_date: "19700101".to_string() };
        let stats = caller.call(&mut out, &run_meta).unwrap();
        assert!(stats.num_calls >= 1, "expected at least one breakpoint call, got {}", stats.num_calls);
    }
}
