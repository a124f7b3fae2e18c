
//! Main entry point for the barclean application.
//!
//! This file handles command-line parsing, logging setup, input validation, and orchestrates
//! the denoising of clonal barcode read tables. Input is either a precomputed TSV read-count
//! table or a directory of tagged FASTQ/FASTA read files, one library per file. The corrected
//! table, the raw-to-canonical sequence mapping, and optionally a dominant-sequence report are
//! written to the specified output directory.

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use itertools::Itertools;
use log::info;
use num_format::{Locale, ToFormattedString};
use rustc_hash::FxHashSet;

use crate::cli::Cli;
use crate::denoise::{DenoiseParams, denoise_reads};
use crate::dominant::dominant_sequences;
use crate::logging::setup_logger;
use crate::table::{GroupKey, ReadRecord, read_reads_table, write_grouped_table};

mod cli;
pub mod cluster;
pub mod denoise;
pub mod distance;
pub mod dominant;
pub mod error;
pub mod ingest;
pub mod io_utils;
pub mod logging;
pub mod progress;
pub mod table;

/// Common initialization required by all commands.
fn init(threads: usize) -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    info!("{} v{}", env!("CARGO_PKG_NAME"), VERSION);
    info!("{}", env::args().collect::<Vec<String>>().join(" "));

    info!("Using {} threads.", threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    Ok(())
}

/// Parse a whitelist file with one canonical sequence per line.
fn parse_whitelist_file(file_path: &Path) -> Result<Vec<String>> {
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);

    let mut whitelist = Vec::new();
    for line in reader.lines() {
        let line = line?;

        // skip comment lines starting with #
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        whitelist.push(line.trim().to_string());
    }

    if whitelist.is_empty() {
        return Err(anyhow::anyhow!("Whitelist file contains no sequences."));
    }

    Ok(whitelist)
}

/// Log unique-element counts and the total read count of a table.
fn log_table_statistics(records: &[ReadRecord], label: &str) {
    let total_reads: u64 = records.iter().map(|r| r.read).sum();
    let unique = |key: GroupKey| {
        records
            .iter()
            .map(|r| r.field(key))
            .collect::<FxHashSet<String>>()
            .len()
    };

    info!(
        "{} table: {} molecules, {} reads, {} libraries, {} cells, {} candidate sequences",
        label,
        records.len().to_formatted_string(&Locale::en),
        total_reads.to_formatted_string(&Locale::en),
        unique(GroupKey::Library),
        unique(GroupKey::CellId),
        unique(GroupKey::CloneId),
    );
}

fn main() -> Result<()> {
    let start = Instant::now();

    let args = Cli::parse();

    setup_logger(&args.out_dir)?;

    init(args.threads)?;

    // determine if input is a precomputed read table or read files to count

    let records = if let Some(read_table) = args.read_table {
        info!("Using read table: {}", read_table.display());
        read_reads_table(&read_table)?
    } else if let Some(input_dir) = args.input_dir {
        info!("Using input directory: {}", input_dir.display());

        // If a directory is specified, scan it for sequence read files.
        let extensions = [".fastq", ".fastq.gz", ".fq", ".fq.gz", ".fasta", ".fasta.gz", ".fa", ".fa.gz"];
        let read_files: Vec<PathBuf> = std::fs::read_dir(input_dir)?
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                extensions.iter().any(|ext| name.ends_with(ext))
            })
            .map(|entry| entry.path())
            .sorted()
            .collect();

        if read_files.is_empty() {
            return Err(anyhow::anyhow!("No read files found in specified directory."));
        }

        info!("Counting reads in {} libraries:", read_files.len());
        ingest::ingest_read_files(&read_files)?
    } else {
        return Err(anyhow::anyhow!("No input specified. Use --read_table or --input_dir."));
    };

    log_table_statistics(&records, "Raw");

    let whitelist = match &args.whitelist {
        Some(whitelist_file) => {
            let whitelist = parse_whitelist_file(whitelist_file)?;
            info!("Using {} whitelist sequences from {}", whitelist.len(), whitelist_file.display());
            Some(whitelist)
        }
        None => None,
    };

    std::fs::create_dir_all(&args.out_dir)?;

    // denoise the target field and write the corrected table

    let params = DenoiseParams {
        target: args.target,
        read_cutoff: args.read_cutoff,
        method: args.method,
        distance_threshold: args.distance_threshold,
        per_sample: args.per_sample,
        whitelist,
        group_keys: args.group_keys.clone(),
    };
    info!(
        "Denoising {} with the {} strategy (read cutoff {})",
        params.target, params.method, params.read_cutoff
    );

    let output = denoise_reads(&records, &params)?;
    info!(
        "Corrected table has {} rows.",
        output.table.len().to_formatted_string(&Locale::en)
    );

    write_grouped_table(&args.out_dir.join("denoised.tsv"), &args.group_keys, &output.table)?;

    // write the raw-to-canonical mapping for auditing or re-application

    let mapping_out_file = File::create(args.out_dir.join("mapping.tsv"))?;
    let mut mapping_writer = BufWriter::new(mapping_out_file);
    writeln!(mapping_writer, "sequence\tcanonical\tpartition")?;
    for (partition, mapping) in &output.mappings {
        let partition = partition.as_deref().unwrap_or("");
        for (sequence, canonical) in mapping.iter().sorted() {
            writeln!(mapping_writer, "{sequence}\t{canonical}\t{partition}")?;
        }
    }

    // optional dominant-sequence report on the raw input table

    if args.dominant {
        let rows = dominant_sequences(&records, GroupKey::CellId, args.target, args.per_length);
        let retained: Vec<_> = rows
            .iter()
            .filter(|row| row.max_read_ratio >= args.min_read_ratio)
            .collect();
        info!(
            "Dominant sequences: {} of {} rows reach a read ratio of {}",
            retained.len().to_formatted_string(&Locale::en),
            rows.len().to_formatted_string(&Locale::en),
            args.min_read_ratio
        );

        let dominance_out_file = File::create(args.out_dir.join("dominance.tsv"))?;
        let mut dominance_writer = BufWriter::new(dominance_out_file);
        writeln!(dominance_writer, "library\tcell_id\tcell_bc\tumi\tclone_id\tread\tmax_read_ratio")?;
        for row in retained {
            writeln!(
                dominance_writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.record.library,
                row.record.cell_id(),
                row.record.cell_bc,
                row.record.umi,
                row.record.clone_id,
                row.record.read,
                row.max_read_ratio
            )?;
        }
    }

    info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
    info!("Done.");

    Ok(())
}
