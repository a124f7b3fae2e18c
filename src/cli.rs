
//! Command-line interface definition for the barclean application.
//!
//! This file defines the `Cli` struct using the `clap` crate to parse and validate command-line arguments.
//! It includes options for specifying the input read table or a directory of tagged read files, the output
//! directory, denoising parameters (target field, read cutoff, clustering strategy, distance threshold,
//! per-sample partitioning, whitelist), aggregation keys, dominant-sequence reporting, and thread count.
//! The CLI output is styled using the `anstyle` crate for improved readability.

use std::path::PathBuf;

use clap::Parser;

use crate::cluster::ClusterMethod;
use crate::table::{GroupKey, TargetField};

const DEFAULT_READ_CUTOFF: u64 = 3;
const DEFAULT_MIN_READ_RATIO: f64 = 0.6;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(styles=get_styles())]
#[command(disable_help_subcommand = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// TSV read-count table (columns: library, cell_bc, umi, clone_id, read)
    #[arg(short = 'r', long, help_heading = "Inputs", group = "input", value_parser = clap::value_parser!(PathBuf))]
    pub read_table: Option<PathBuf>,

    /// Directory of tagged FASTQ/FASTA read files to count, one library per file
    #[arg(short = 'i', long, help_heading = "Inputs", group = "input", value_parser = clap::value_parser!(PathBuf))]
    pub input_dir: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub out_dir: PathBuf,

    /// Field to denoise (clone_id or cell_bc)
    #[arg(long, help_heading = "Denoising", default_value = "clone_id")]
    pub target: TargetField,

    /// Minimum read count for a sequence to seed or join a cluster
    #[arg(short = 'c', long, help_heading = "Denoising", default_value_t = DEFAULT_READ_CUTOFF)]
    pub read_cutoff: u64,

    /// Clustering strategy (hamming, directional, or alignment)
    #[arg(short = 'm', long, help_heading = "Denoising", default_value = "hamming", value_parser = parse_method)]
    pub method: ClusterMethod,

    /// Maximum distance for two sequences to be connected [default: 1; directional: 10% of sequence length]
    #[arg(short = 'd', long, help_heading = "Denoising")]
    pub distance_threshold: Option<usize>,

    /// Denoise independently within each value of this key (library or cell_id)
    #[arg(long, help_heading = "Denoising")]
    pub per_sample: Option<GroupKey>,

    /// File with one canonical whitelist sequence per line (hamming strategy only)
    #[arg(short = 'w', long, help_heading = "Denoising", value_parser = clap::value_parser!(PathBuf))]
    pub whitelist: Option<PathBuf>,

    /// Comma-separated keys the corrected table is aggregated over
    #[arg(
        long,
        help_heading = "Output",
        value_delimiter = ',',
        default_value = "library,cell_id,cell_bc,clone_id,umi"
    )]
    pub group_keys: Vec<GroupKey>,

    /// Report the dominant sequence(s) per cell to dominance.tsv
    #[arg(long, help_heading = "Dominance", default_value_t = false)]
    pub dominant: bool,

    /// Keep only cells whose dominant-read ratio reaches this value
    #[arg(long, help_heading = "Dominance", default_value_t = DEFAULT_MIN_READ_RATIO, value_parser = validate_ratio)]
    pub min_read_ratio: f64,

    /// Treat each sequence length separately when ranking dominant sequences
    #[arg(long, help_heading = "Dominance", default_value_t = false)]
    pub per_length: bool,

    /// Number of threads to use
    #[arg(short, long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

fn parse_method(method: &str) -> Result<ClusterMethod, String> {
    method.parse().map_err(|err| format!("{err}"))
}

fn validate_ratio(ratio: &str) -> Result<f64, String> {
    let ratio: f64 = ratio
        .parse()
        .map_err(|_| format!("`{ratio}` isn't a valid ratio"))?;

    if !(0.0..=1.0).contains(&ratio) {
        return Err("Ratio must be in the range [0, 1]".to_string());
    }

    Ok(ratio)
}

fn validate_threads(threads: &str) -> Result<usize, String> {
    let threads: usize = threads
        .parse()
        .map_err(|_| format!("`{threads}` isn't a valid value"))?;

    if !(1..=1024).contains(&threads) {
        return Err("Threads must be in the range [1, 1024]".to_string());
    }

    Ok(threads)
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}

#[test]
fn test_verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}
