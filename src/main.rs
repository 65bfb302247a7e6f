use std::fs::{self, File};
use std::io::BufWriter;
use std::process;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};

use brkpt_caller::{
    BreakpointCaller, Config, DeBruijnGraph, KoGraph, MemGraph, NoOracle, RunMeta,
    DEFAULT_KMER_SIZE,
};

/// Today's date as `YYYYMMDD`, for the output header's `##fileDate=` line.
/// Converts days-since-epoch to a civil (Gregorian) date with Howard
/// Hinnant's `civil_from_days` algorithm rather than pulling in a date
/// crate for one header field.
fn today_yyyymmdd() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let z = (secs / 86_400) as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{:04}{:02}{:02}", y, m, d)
}

/// Parse a size with optional k/M/B suffix (decimal: k=1000, M=1_000_000, B=1_000_000_000).
fn parse_size_suffix(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (num_str, mult) = match s.as_bytes().last() {
        Some(b'k') | Some(b'K') => (&s[..s.len() - 1], 1_000usize),
        Some(b'M') | Some(b'm') => (&s[..s.len() - 1], 1_000_000usize),
        Some(b'B') | Some(b'b') => (&s[..s.len() - 1], 1_000_000_000usize),
        _ => (s, 1usize),
    };
    let n: usize = num_str.parse().map_err(|_| format!("invalid number: '{}'", num_str))?;
    n.checked_mul(mult).ok_or_else(|| format!("'{}' overflows usize", s))
}

/// Minimal FASTA reader: returns (name, sequence) pairs, uppercasing
/// bases and leaving any non-ACGT byte (N, IUPAC codes) as-is — k-mer
/// extraction downstream simply skips windows it can't encode.
fn read_fasta(path: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
    let text = fs::read_to_string(path)?;
    let mut records = Vec::new();
    let mut name = String::new();
    let mut seq = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix('>') {
            if !name.is_empty() || !seq.is_empty() {
                records.push((std::mem::take(&mut name), std::mem::take(&mut seq)));
            }
            name = rest.trim().to_string();
        } else {
            seq.extend(line.trim().bytes().map(|b| b.to_ascii_uppercase()));
        }
    }
    if !name.is_empty() || !seq.is_empty() {
        records.push((name, seq));
    }
    Ok(records)
}

#[derive(Parser)]
#[command(about = "Structural breakpoint calling over a coloured de Bruijn graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call breakpoints between one or more sample colours and a reference
    Call {
        /// Sample FASTA files, one colour per file
        samples: Vec<String>,

        /// Reference FASTA file(s), comma-separated
        #[arg(long, value_delimiter = ',')]
        graph_fasta: Vec<String>,

        /// Output file (gzip-compressed)
        #[arg(long)]
        out: String,

        /// K-mer size
        #[arg(long, default_value_t = DEFAULT_KMER_SIZE)]
        kmer_size: usize,

        /// Number of worker threads
        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Minimum k-mers of reference homology required on each flank
        #[arg(long, default_value_t = brkpt_caller::DEFAULT_MIN_REF_FLANK)]
        min_ref_flank: usize,

        /// Maximum k-mers the 5' reverse crawler will traverse
        #[arg(long, default_value = "1000", value_parser = parse_size_suffix)]
        max_ref_flank: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Call { samples, graph_fasta, out, kmer_size, threads, min_ref_flank, max_ref_flank } => {
            if let Err(e) = run_call(samples, graph_fasta, out, kmer_size, threads, min_ref_flank, max_ref_flank) {
                eprintln!("error: {:#}", e);
                process::exit(1);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_call(
    samples: Vec<String>,
    graph_fasta: Vec<String>,
    out: String,
    kmer_size: usize,
    threads: usize,
    min_ref_flank: usize,
    max_ref_flank: usize,
) -> anyhow::Result<()> {
    if samples.is_empty() {
        anyhow::bail!("at least one sample FASTA file is required");
    }
    if graph_fasta.is_empty() {
        anyhow::bail!("--graph-fasta is required");
    }

    let t0 = Instant::now();
    let mut graph = MemGraph::new(kmer_size, samples.len());
    for (colour, path) in samples.iter().enumerate() {
        let records = read_fasta(path)?;
        for (_name, seq) in &records {
            graph.add_sequence(colour, seq);
        }
    }
    log::info!("graph built: {} nodes in {:.3}s", graph.num_nodes(), t0.elapsed().as_secs_f64());

    let mut refs = Vec::new();
    for path in &graph_fasta {
        refs.extend(read_fasta(path)?);
    }
    let kograph = KoGraph::build(&graph, &refs);

    let config = Config {
        num_of_threads: threads.max(1),
        min_ref_flank,
        max_ref_flank,
        kmer_size,
        seq_paths: graph_fasta.clone(),
    };

    let run_meta = RunMeta {
        cmdline: std::env::args().collect::<Vec<_>>().join(" "),
        wkdir: std::env::current_dir().ok().map(|p| p.display().to_string()),
        file_date: today_yyyymmdd(),
    };

    let out_file = File::create(&out)?;
    let writer = BufWriter::new(out_file);

    let caller = BreakpointCaller::new(&config, &graph, &kograph, &NoOracle);
    let stats = caller.call(writer, &run_meta)?;

    println!("Calls written: {}", stats.num_calls);
    println!("Output:        {}", out);
    println!("Time:          {:.3}s", t0.elapsed().as_secs_f64());

    Ok(())
}
