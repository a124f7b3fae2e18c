//! Build a read-count table from tagged sequence files.
//!
//! Each input file holds the reads of one library, already trimmed to the
//! candidate barcode: the record id carries `sample,cell_bc,umi` and the
//! record sequence is the candidate clone barcode. Reads collapsing to the
//! same (cell barcode, UMI, sequence) key are counted into a single table
//! row. Gzip-compressed files are handled transparently.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::info;
use needletail::parse_fastx_file;
use rustc_hash::FxHashMap;

use crate::io_utils::library_id_from_filename;
use crate::progress::progress_bar;
use crate::table::ReadRecord;

/// Count reads across one library per file; records are returned sorted by
/// (library, cell barcode, UMI, sequence).
pub fn ingest_read_files(read_files: &[PathBuf]) -> Result<Vec<ReadRecord>> {
    let progress_bar = progress_bar(read_files.len() as u64);

    let mut records = Vec::new();
    for read_file in read_files {
        let library = library_id_from_filename(read_file);
        let library_records = ingest_library(read_file, &library)?;
        info!(
            " - {}: {} unique molecules",
            library,
            library_records.len()
        );
        records.extend(library_records);
        progress_bar.inc(1);
    }
    progress_bar.finish();

    Ok(records)
}

/// Count the reads of a single library file.
fn ingest_library(read_file: &PathBuf, library: &str) -> Result<Vec<ReadRecord>> {
    let mut counts: FxHashMap<(String, String, String), u64> = FxHashMap::default();

    let mut fastx_reader = parse_fastx_file(read_file)
        .context(format!("Failed to open {}", read_file.display()))?;
    while let Some(rec) = fastx_reader.next() {
        let record = rec?;

        let id = std::str::from_utf8(record.id())?;
        let (_sample, cell_bc, umi) = id.split(',').collect_tuple().ok_or_else(|| {
            anyhow!(
                "Invalid read tag `{id}` in {}: expected `sample,cell_bc,umi`",
                read_file.display()
            )
        })?;

        let sequence = String::from_utf8(record.seq().to_vec())?;
        *counts
            .entry((cell_bc.to_string(), umi.to_string(), sequence))
            .or_insert(0) += 1;
    }

    let records = counts
        .into_iter()
        .map(|((cell_bc, umi, clone_id), read)| ReadRecord {
            library: library.to_string(),
            cell_bc,
            umi,
            clone_id,
            read,
        })
        .sorted_by(|a, b| {
            (&a.cell_bc, &a.umi, &a.clone_id).cmp(&(&b.cell_bc, &b.umi, &b.clone_id))
        })
        .collect();

    Ok(records)
}
