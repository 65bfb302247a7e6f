pub mod cache;
pub mod caller;
pub mod crawler;
pub mod graph;
pub mod kmer;
pub mod kograph;
pub mod output;
pub mod types;

pub use caller::BreakpointCaller;
pub use cache::{GCachePath, GraphCache, MultiColPath, PathId, SnodeId};
pub use graph::{slot, DeBruijnGraph, MemGraph, NoOracle, PathOracle, UNION_COLOUR};
pub use kmer::{encode_base, node_chain_sequence, PackedKmer};
pub use kograph::{filter_min_len, KoGraph};
pub use types::{
    BreakpointError, CallStats, Config, DbNode, Edges, HKey, KOccurRun, Orientation,
    ReferenceOccurrence, RunMeta, Strand, DEFAULT_KMER_SIZE, DEFAULT_MAX_REF_FLANK,
    DEFAULT_MIN_REF_FLANK,
};
