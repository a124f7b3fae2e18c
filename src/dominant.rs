//! Dominant-sequence selection.
//!
//! For every cell the candidate sequence(s) with the maximum summed read
//! count are identified along with the fraction of the cell's total reads
//! they hold. The ratio feeds downstream consensus calling, where a cell is
//! typically accepted only when its dominant sequence clears a caller-chosen
//! threshold.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::table::{GroupKey, ReadRecord, TargetField};

/// An original row re-joined to its group's summed read count and the cell's
/// dominance ratio.
#[derive(Clone, Debug, PartialEq)]
pub struct DominantRow {
    pub record: ReadRecord,
    pub max_read_ratio: f64,
}

/// Select the dominant sequence(s) per cell.
///
/// Reads are summed per (cell key, sequence) group, or per (cell key,
/// sequence, sequence length) when `per_length` is set, which treats each
/// candidate length separately. For each cell, every group tied at the
/// maximum summed read count is retained, so a cell can report more than one
/// dominant sequence. Surviving rows carry the group's summed reads in place
/// of their own and the ratio of the maximum to the cell's total.
pub fn dominant_sequences(
    records: &[ReadRecord],
    cell_key: GroupKey,
    target: TargetField,
    per_length: bool,
) -> Vec<DominantRow> {
    let group = |record: &ReadRecord| {
        let sequence = record.target(target).to_string();
        let length = if per_length { sequence.len() } else { 0 };
        (record.field(cell_key), sequence, length)
    };

    // summed reads per (cell, sequence[, length]) group
    let mut group_reads: FxHashMap<(String, String, usize), u64> = FxHashMap::default();
    for record in records {
        *group_reads.entry(group(record)).or_insert(0) += record.read;
    }

    // per cell: total reads and the maximum group read
    let mut cell_totals: FxHashMap<&str, (u64, u64)> = FxHashMap::default();
    for ((cell, _, _), &reads) in &group_reads {
        let entry = cell_totals.entry(cell).or_insert((0, 0));
        entry.0 += reads;
        entry.1 = entry.1.max(reads);
    }

    records
        .iter()
        .filter_map(|record| {
            let key = group(record);
            let reads = group_reads[&key];
            let (total, max) = cell_totals[key.0.as_str()];
            if reads < max {
                return None;
            }

            let mut dominant = record.clone();
            dominant.read = reads;
            Some(DominantRow {
                record: dominant,
                max_read_ratio: max as f64 / total as f64,
            })
        })
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cell_bc: &str, umi: &str, clone_id: &str, read: u64) -> ReadRecord {
        ReadRecord {
            library: "L1".to_string(),
            cell_bc: cell_bc.to_string(),
            umi: umi.to_string(),
            clone_id: clone_id.to_string(),
            read,
        }
    }

    fn select(records: &[ReadRecord]) -> Vec<DominantRow> {
        dominant_sequences(records, GroupKey::CellBc, TargetField::CloneId, false)
    }

    #[test]
    fn test_single_dominant_sequence() {
        let records = vec![
            record("c1", "u1", "AAAA", 6),
            record("c1", "u2", "AAAA", 4),
            record("c1", "u3", "GGGG", 2),
        ];

        let rows = select(&records);

        // both AAAA molecules survive with the summed group read
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.record.clone_id, "AAAA");
            assert_eq!(row.record.read, 10);
            assert!((row.max_read_ratio - 10.0 / 12.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ties_are_all_retained() {
        let records = vec![
            record("c1", "u1", "XAAA", 10),
            record("c1", "u2", "YAAA", 10),
            record("c1", "u3", "ZAAA", 2),
        ];

        let rows = select(&records);

        let sequences: Vec<&str> = rows.iter().map(|row| row.record.clone_id.as_str()).collect();
        assert_eq!(sequences, vec!["XAAA", "YAAA"]);
        for row in &rows {
            assert!((row.max_read_ratio - 10.0 / 22.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cells_are_independent() {
        let records = vec![
            record("c1", "u1", "AAAA", 10),
            record("c1", "u2", "GGGG", 1),
            record("c2", "u3", "GGGG", 3),
        ];

        let rows = select(&records);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record.cell_bc, "c1");
        assert_eq!(rows[0].record.clone_id, "AAAA");
        assert!((rows[0].max_read_ratio - 10.0 / 11.0).abs() < 1e-12);

        // c2 has a single candidate, dominant by definition
        assert_eq!(rows[1].record.cell_bc, "c2");
        assert_eq!(rows[1].max_read_ratio, 1.0);
    }

    #[test]
    fn test_per_length_grouping() {
        // a sequence determines its own length, so the length-aware grouping
        // cannot split a (cell, sequence) group further; dominance must come
        // out the same with and without it
        let records = vec![
            record("c1", "u1", "AAAATTTT", 3),
            record("c1", "u2", "AAAATTTT", 3),
            record("c1", "u3", "AAAA", 5),
        ];

        let pooled = dominant_sequences(&records, GroupKey::CellBc, TargetField::CloneId, false);
        let per_length = dominant_sequences(&records, GroupKey::CellBc, TargetField::CloneId, true);

        assert_eq!(pooled, per_length);
        assert!(pooled.iter().all(|row| row.record.clone_id == "AAAATTTT"));
        assert!(pooled.iter().all(|row| row.record.read == 6));
    }

    #[test]
    fn test_empty_input() {
        assert!(select(&[]).is_empty());
    }
}
