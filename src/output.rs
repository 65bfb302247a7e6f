//! Output formatter (Component G): header block and per-call records,
//! gzip-compressed.

use std::io::{self, Write};

use crate::kograph::KoGraph;
use crate::types::{Config, KOccurRun, RunMeta};

/// Emit the `##`-prefixed header block, one line per field, exactly in
/// the field order the original tool prints: format, date, command,
/// working directory, reference paths, version, k-mer size. Under a
/// fixed thread count, rerunning with the same inputs reproduces every
/// line byte-for-byte except `fileDate`, `cmd`, and `wkdir`.
pub fn write_header<W: Write>(w: &mut W, config: &Config, meta: &RunMeta) -> io::Result<()> {
    writeln!(w, "##fileFormat=CtxBreakpointsv0.1")?;
    writeln!(w, "##fileDate={}", meta.file_date)?;
    writeln!(w, "##cmd=\"{}\"", meta.cmdline)?;
    if let Some(wkdir) = &meta.wkdir {
        writeln!(w, "##wkdir={}", wkdir)?;
    }
    write!(w, "##reference=")?;
    for (i, path) in config.seq_paths.iter().enumerate() {
        if i > 0 {
            write!(w, ":")?;
        }
        write!(w, "{}", path)?;
    }
    writeln!(w)?;
    writeln!(w, "##ctxVersion=\"{}\"", env!("CARGO_PKG_VERSION"))?;
    writeln!(w, "##ctxKmerSize={}", config.kmer_size)?;
    Ok(())
}

fn format_run(run: &KOccurRun, kmer_size: usize, kograph: &KoGraph) -> String {
    let k = kmer_size as i64;
    let (start, end) = match run.strand {
        crate::types::Strand::Plus => (run.first, run.last + k - 1),
        crate::types::Strand::Minus => (run.first + k - 1, run.last),
    };
    let chrom = kograph
        .chrom_names
        .get(run.chrom as usize)
        .map(String::as_str)
        .unwrap_or("?");
    format!("{}:{}-{}:{}:{}", chrom, start + 1, end + 1, run.strand.as_char(), run.qoffset)
}

fn format_runs(runs: &[KOccurRun], kmer_size: usize, kograph: &KoGraph) -> String {
    runs.iter().map(|r| format_run(r, kmer_size, kograph)).collect::<Vec<_>>().join(",")
}

/// Write one call's three records (5' flank / 3' flank / connecting
/// path) as FASTA-like blocks annotated with their reference contacts.
#[allow(clippy::too_many_arguments)]
pub fn write_call<W: Write>(
    w: &mut W,
    call_id: u64,
    kmer_size: usize,
    kograph: &KoGraph,
    flank5p_seq: &[u8],
    flank5p_runs: &[KOccurRun],
    flank3p_seq: &[u8],
    flank3p_runs: &[KOccurRun],
    path_seq: &[u8],
    cols: &[usize],
) -> io::Result<()> {
    let col_list = cols.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");

    writeln!(w, ">call.{}.5pflank chr={}", call_id, format_runs(flank5p_runs, kmer_size, kograph))?;
    w.write_all(flank5p_seq)?;
    writeln!(w)?;

    writeln!(w, ">call.{}.3pflank chr={}", call_id, format_runs(flank3p_runs, kmer_size, kograph))?;
    w.write_all(flank3p_seq)?;
    writeln!(w)?;

    writeln!(w, ">call.{}.path cols={}", call_id, col_list)?;
    w.write_all(path_seq)?;
    writeln!(w)?;

    Ok(())
}
