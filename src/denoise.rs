//! Denoising of sequencing/PCR errors in a read-count table.
//!
//! The orchestrator filters the table to rows above a read cutoff, clusters
//! the target-field sequences (optionally independently within each value of
//! a partition key, e.g. per library), rewrites each sequence to its cluster's
//! canonical representative, drops rows that end up unmapped, and
//! re-aggregates read counts over the configured grouping keys.
//!
//! Partitions carry no cross-partition data dependency and are denoised in
//! parallel.

use std::collections::BTreeMap;

use indicatif::ProgressBar;
use log::info;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterMethod, Mapping, cluster_sequences};
use crate::error::DenoiseError;
use crate::progress::progress_bar;
use crate::table::{GroupKey, GroupedRow, ReadRecord, TargetField, group_reads};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Field whose sequences are corrected.
    pub target: TargetField,
    /// Minimum read count for a sequence's rows to seed or join a cluster.
    pub read_cutoff: u64,
    pub method: ClusterMethod,
    /// Maximum distance for two sequences to be connected; None applies the
    /// per-strategy default.
    pub distance_threshold: Option<usize>,
    /// Denoise independently within each distinct value of this key.
    pub per_sample: Option<GroupKey>,
    /// Externally supplied canonical sequences (Hamming strategy only).
    pub whitelist: Option<Vec<String>>,
    /// Keys the corrected table is re-aggregated over.
    pub group_keys: Vec<GroupKey>,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        DenoiseParams {
            target: TargetField::CloneId,
            read_cutoff: 3,
            method: ClusterMethod::Hamming,
            distance_threshold: None,
            per_sample: None,
            whitelist: None,
            group_keys: vec![
                GroupKey::Library,
                GroupKey::CellId,
                GroupKey::CellBc,
                GroupKey::CloneId,
                GroupKey::Umi,
            ],
        }
    }
}

/// Result of one denoising call.
pub struct DenoiseOutput {
    /// Corrected, re-aggregated table; every target value is canonical.
    pub table: Vec<GroupedRow>,
    /// Raw-to-canonical mappings, one per partition (partition key `None`
    /// when denoising was not partitioned). Usable for auditing or
    /// re-application.
    pub mappings: Vec<(Option<String>, Mapping)>,
}

/// Denoise the target field of a read-count table.
///
/// Rows below the read cutoff are excluded from clustering and dropped from
/// the output, as are rows whose sequence no whitelist entry claims. The
/// mapping and output table are built fresh on every call.
pub fn denoise_reads(
    records: &[ReadRecord],
    params: &DenoiseParams,
) -> Result<DenoiseOutput, DenoiseError> {
    let raw_total: u64 = records.iter().map(|r| r.read).sum();
    let above_cutoff_total: u64 = records
        .iter()
        .filter(|r| r.read >= params.read_cutoff)
        .map(|r| r.read)
        .sum();

    let (corrected, mappings) = match params.per_sample {
        Some(partition_key) => {
            info!("Denoising mode: per {partition_key}");

            let mut partitions: BTreeMap<String, Vec<&ReadRecord>> = BTreeMap::new();
            for record in records {
                partitions.entry(record.field(partition_key)).or_default().push(record);
            }

            let progress_bar = progress_bar(partitions.len() as u64);
            let results = denoise_partitions(partitions, params, &progress_bar)?;
            progress_bar.finish();

            let mut corrected = Vec::new();
            let mut mappings = Vec::new();
            for (partition, rows, mapping) in results {
                corrected.extend(rows);
                mappings.push((Some(partition), mapping));
            }
            (corrected, mappings)
        }
        None => {
            let rows: Vec<&ReadRecord> = records.iter().collect();
            let (corrected, mapping) = denoise_partition(&rows, params)?;
            (corrected, vec![(None, mapping)])
        }
    };

    let corrected_total: u64 = corrected.iter().map(|r| r.read).sum();
    if raw_total > 0 {
        info!(
            "Retained read fraction: {:.2} of raw, {:.2} of above-cutoff input",
            corrected_total as f64 / raw_total as f64,
            if above_cutoff_total > 0 {
                corrected_total as f64 / above_cutoff_total as f64
            } else {
                0.0
            }
        );
    }

    let table = group_reads(&corrected, &params.group_keys, true);
    Ok(DenoiseOutput { table, mappings })
}

/// Denoise every partition in parallel, keeping the partition order.
fn denoise_partitions(
    partitions: BTreeMap<String, Vec<&ReadRecord>>,
    params: &DenoiseParams,
    progress_bar: &ProgressBar,
) -> Result<Vec<(String, Vec<ReadRecord>, Mapping)>, DenoiseError> {
    partitions
        .into_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(partition, rows)| {
            let (corrected, mapping) = denoise_partition(&rows, params)?;
            progress_bar.inc(1);
            Ok((partition, corrected, mapping))
        })
        .collect()
}

/// Filter, cluster, and correct one set of rows.
fn denoise_partition(
    records: &[&ReadRecord],
    params: &DenoiseParams,
) -> Result<(Vec<ReadRecord>, Mapping), DenoiseError> {
    let above: Vec<&ReadRecord> = records
        .iter()
        .filter(|r| r.read >= params.read_cutoff)
        .copied()
        .collect();
    if above.is_empty() {
        return Ok((Vec::new(), Mapping::default()));
    }

    let seqs: Vec<String> = above.iter().map(|r| r.target(params.target).to_string()).collect();
    let reads: Vec<u64> = above.iter().map(|r| r.read).collect();

    let mapping = cluster_sequences(
        &seqs,
        &reads,
        params.distance_threshold,
        params.method,
        params.whitelist.as_deref(),
    )?;

    // rows whose sequence stays unmapped (whitelist miss) are dropped
    let corrected: Vec<ReadRecord> = above
        .into_iter()
        .filter_map(|record| {
            mapping.get(record.target(params.target)).map(|canonical| {
                let mut corrected = record.clone();
                corrected.set_target(params.target, canonical.clone());
                corrected
            })
        })
        .collect();

    Ok((corrected, mapping))
}
