use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use phasecall::{BasecallerRead, Decoder, DecoderConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "phasecall", about = "Flow-space base caller with phasing-aware tree search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ChemistryArgs {
    /// Nucleotide dispensation cycle.
    #[arg(long, default_value = DecoderConfig::DEFAULT_FLOW_ORDER)]
    flow_order: String,
    /// Carry-forward rate.
    #[arg(long, default_value_t = 0.0)]
    carry_forward: f64,
    /// Incomplete-extension rate.
    #[arg(long, default_value_t = 0.0)]
    incomplete_extension: f64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call bases from flowgrams (whitespace-separated signal values, one read per line).
    Decode {
        /// Flowgram file; blank lines and lines starting with `#` are skipped.
        flowgrams: PathBuf,
        #[command(flatten)]
        chemistry: ChemistryArgs,
        /// Flows per read (default: length of the first flowgram).
        #[arg(long)]
        num_flows: Option<usize>,
        /// Flows per normalization window.
        #[arg(long, default_value_t = DecoderConfig::DEFAULT_WINDOW_SIZE)]
        window_size: usize,
        /// Drop paths lagging the furthest path by more than this many flows.
        #[arg(long, default_value_t = DecoderConfig::DEFAULT_MAX_PATH_DELAY)]
        max_path_delay: usize,
        /// Also report per-base quality penalties.
        #[arg(long)]
        qv: bool,
    },
    /// Predict flowgrams for base sequences (one sequence per line).
    Simulate {
        /// Sequence file.
        sequences: PathBuf,
        #[command(flatten)]
        chemistry: ChemistryArgs,
        /// Flows per read.
        #[arg(long)]
        num_flows: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            flowgrams,
            chemistry,
            num_flows,
            window_size,
            max_path_delay,
            qv,
        } => run_decode(flowgrams, chemistry, num_flows, window_size, max_path_delay, qv)?,
        Commands::Simulate {
            sequences,
            chemistry,
            num_flows,
        } => run_simulate(sequences, chemistry, num_flows)?,
    }

    Ok(())
}

fn run_decode(
    flowgrams_path: PathBuf,
    chemistry: ChemistryArgs,
    num_flows: Option<usize>,
    window_size: usize,
    max_path_delay: usize,
    qv: bool,
) -> Result<()> {
    let flowgrams = read_flowgram_file(&flowgrams_path).with_context(|| {
        format!(
            "failed to read flowgrams from {}",
            flowgrams_path.display()
        )
    })?;
    let Some(first) = flowgrams.first() else {
        bail!("no flowgrams in {}", flowgrams_path.display());
    };
    let num_flows = num_flows.unwrap_or(first.len());

    let config = DecoderConfig::new(chemistry.flow_order, num_flows)
        .context("invalid flow configuration")?
        .with_phasing(chemistry.carry_forward, chemistry.incomplete_extension)
        .with_window_size(window_size)
        .context("invalid normalization window")?
        .with_max_path_delay(max_path_delay);
    let mut decoder = Decoder::new(&config).context("failed to initialize decoder")?;
    info!(reads = flowgrams.len(), num_flows, "decoding");

    for (idx, signal) in flowgrams.into_iter().enumerate() {
        let mut read = BasecallerRead::new(signal);
        decoder
            .normalize_and_solve(&mut read)
            .with_context(|| format!("decoding failed for read {}", idx + 1))?;

        println!(
            "read {}\tbases={}\tresidual={:.4}\tsequence={}",
            idx + 1,
            read.sequence.len(),
            read.squared_residual(),
            read.sequence_string()
        );

        if qv {
            decoder
                .compute_qv_metrics(&mut read)
                .with_context(|| format!("quality metrics failed for read {}", idx + 1))?;
            println!("  penalty_residual\t{}", format_values(&read.penalty_residual));
            println!("  penalty_mismatch\t{}", format_values(&read.penalty_mismatch));
        }
    }

    Ok(())
}

fn run_simulate(sequences_path: PathBuf, chemistry: ChemistryArgs, num_flows: usize) -> Result<()> {
    let config = DecoderConfig::new(chemistry.flow_order, num_flows)
        .context("invalid flow configuration")?
        .with_phasing(chemistry.carry_forward, chemistry.incomplete_extension);
    let mut decoder = Decoder::new(&config).context("failed to initialize decoder")?;

    let reader = BufReader::new(File::open(&sequences_path).with_context(|| {
        format!("failed to open sequence file {}", sequences_path.display())
    })?);

    for (idx, line) in reader.lines().enumerate() {
        let sequence = line?.trim().to_ascii_uppercase();
        if sequence.is_empty() || sequence.starts_with('#') {
            continue;
        }
        let mut read = BasecallerRead::new(vec![0.0; num_flows]).with_sequence(sequence);
        decoder
            .simulate(&mut read, num_flows)
            .with_context(|| format!("simulation failed for sequence on line {}", idx + 1))?;
        println!("{}", format_values(&read.prediction));
    }

    Ok(())
}

fn read_flowgram_file(path: &PathBuf) -> Result<Vec<Vec<f32>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut flowgrams = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let signal = line
            .split_whitespace()
            .map(|value| {
                value.parse::<f32>().with_context(|| {
                    format!("invalid signal value '{}' on line {}", value, line_no + 1)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        flowgrams.push(signal);
    }

    Ok(flowgrams)
}

fn format_values(values: &[f32]) -> String {
    values
        .iter()
        .map(|value| format!("{value:.4}"))
        .collect::<Vec<_>>()
        .join("\t")
}
