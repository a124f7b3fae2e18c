//! Greedy clustering of near-identical sequences.
//!
//! Unique sequences are ordered by descending read count and clusters are
//! discovered one at a time: the highest-ranked unassigned sequence seeds a
//! cluster and absorbs every still-unassigned sequence within the distance
//! threshold. The partition is greedy rather than globally optimal, and which
//! sequence becomes canonical depends on the read-count order; downstream
//! interpretation relies on exactly this policy, so alternative clustering
//! heuristics are deliberately not offered.
//!
//! Three strategies implement the same `cluster(sequences, counts, threshold)`
//! contract: plain Hamming (the default), a directional algorithm equivalent
//! to UMI-tools (Smith et al., 2017), and a global-alignment variant with a
//! read-ratio side-constraint.

use std::fmt;
use std::str::FromStr;

use bio::alignment::pairwise::Aligner;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::distance::{common_length, hamming};
use crate::error::DenoiseError;

/// Map from raw sequence to its canonical representative.
pub type Mapping = FxHashMap<String, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMethod {
    /// Greedy seed-and-absorb on per-base Hamming distance.
    #[default]
    Hamming,
    /// Directional clustering with the count-gradient rule of UMI-tools.
    Directional,
    /// Global-alignment edit distance plus a 10% read-ratio constraint.
    Alignment,
}

impl ClusterMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ClusterMethod::Hamming => "hamming",
            ClusterMethod::Directional => "directional",
            ClusterMethod::Alignment => "alignment",
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClusterMethod {
    type Err = DenoiseError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "hamming" => Ok(ClusterMethod::Hamming),
            "directional" => Ok(ClusterMethod::Directional),
            "alignment" => Ok(ClusterMethod::Alignment),
            _ => Err(DenoiseError::InvalidMethod(tag.to_string())),
        }
    }
}

/// Unique sequence pool ordered by descending total read count.
///
/// Duplicate input sequences are aggregated by summing their reads; ties are
/// broken by first-occurrence order (the sort is stable).
fn ranked_pool(seqs: &[String], reads: &[u64]) -> Vec<(String, u64)> {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut pool: Vec<(String, u64)> = Vec::new();

    for (seq, &read) in seqs.iter().zip(reads.iter()) {
        match index.get(seq.as_str()) {
            Some(&i) => pool[i].1 += read,
            None => {
                index.insert(seq.as_str(), pool.len());
                pool.push((seq.clone(), read));
            }
        }
    }

    pool.sort_by(|a, b| b.1.cmp(&a.1));
    pool
}

/// Cluster sequences and return the raw-to-canonical mapping.
///
/// `seqs` need not be unique; reads of identical sequences are aggregated.
/// Without a whitelist the mapping is total over the input sequences. With a
/// whitelist (Hamming strategy only) canonical representatives are taken from
/// the whitelist in its given order, and pool sequences not within the
/// threshold of any entry are absent from the mapping. A `None` threshold
/// defaults to 1, except for the directional strategy which uses 10% of the
/// sequence length.
pub fn cluster_sequences(
    seqs: &[String],
    reads: &[u64],
    threshold: Option<usize>,
    method: ClusterMethod,
    whitelist: Option<&[String]>,
) -> Result<Mapping, DenoiseError> {
    if seqs.len() != reads.len() {
        return Err(DenoiseError::LengthMismatch(format!(
            "{} read counts supplied for {} sequences",
            reads.len(),
            seqs.len()
        )));
    }

    if whitelist.is_some() && method != ClusterMethod::Hamming {
        return Err(DenoiseError::IncompatibleOptions(format!(
            "a whitelist cannot be combined with the {method} strategy"
        )));
    }

    if seqs.is_empty() {
        return Ok(Mapping::default());
    }

    let pool = ranked_pool(seqs, reads);

    match method {
        ClusterMethod::Hamming => {
            common_length(
                pool.iter()
                    .map(|(seq, _)| seq.as_str())
                    .chain(whitelist.into_iter().flatten().map(String::as_str)),
            )?;

            let threshold = threshold.unwrap_or(1);
            match whitelist {
                None => Ok(cluster_hamming(&pool, threshold)),
                Some(whitelist) => Ok(cluster_whitelist(&pool, whitelist, threshold)),
            }
        }
        ClusterMethod::Directional => {
            let length = common_length(pool.iter().map(|(seq, _)| seq.as_str()))?;
            let threshold = threshold
                .unwrap_or_else(|| (0.1 * length.unwrap_or(0) as f64).round() as usize);

            Ok(cluster_directional(&pool, threshold))
        }
        ClusterMethod::Alignment => Ok(cluster_alignment(&pool, threshold.unwrap_or(1))),
    }
}

/// Greedy Hamming clustering over a read-ranked pool.
fn cluster_hamming(pool: &[(String, u64)], threshold: usize) -> Mapping {
    let mut mapping = Mapping::default();
    let mut unassigned = vec![true; pool.len()];

    for i in 0..pool.len() {
        if !unassigned[i] {
            continue;
        }

        // everything before i is already assigned, so i is the remaining
        // sequence with the most reads; it seeds the next cluster
        let seed = pool[i].0.as_bytes();
        for j in i..pool.len() {
            if unassigned[j] && hamming(seed, pool[j].0.as_bytes()) <= threshold {
                mapping.insert(pool[j].0.clone(), pool[i].0.clone());
                unassigned[j] = false;
            }
        }
    }

    mapping
}

/// Assign pool sequences to externally supplied canonical sequences.
///
/// Whitelist entries are visited in their given order and claim every
/// still-unassigned pool sequence within the threshold. With a threshold of
/// zero only exact matches survive.
fn cluster_whitelist(pool: &[(String, u64)], whitelist: &[String], threshold: usize) -> Mapping {
    let mut mapping = Mapping::default();
    let mut unassigned = vec![true; pool.len()];

    for canonical in whitelist {
        if threshold == 0 {
            mapping.insert(canonical.clone(), canonical.clone());
            continue;
        }

        let canonical_bytes = canonical.as_bytes();
        for j in 0..pool.len() {
            if unassigned[j] && hamming(canonical_bytes, pool[j].0.as_bytes()) <= threshold {
                mapping.insert(pool[j].0.clone(), canonical.clone());
                unassigned[j] = false;
            }
        }
    }

    mapping
}

/// Directional clustering (Smith et al., 2017).
///
/// A cluster grows from its root by absorbing unassigned sequences within the
/// threshold of any member whose count satisfies the count-gradient rule
/// `child < parent / 2 + 1`; absorbed members can capture further sequences
/// using their own counts. The root (the most abundant member) is canonical.
fn cluster_directional(pool: &[(String, u64)], threshold: usize) -> Mapping {
    let mut mapping = Mapping::default();
    let mut unassigned = vec![true; pool.len()];
    let mut queue: Vec<usize> = Vec::new();

    for i in 0..pool.len() {
        if !unassigned[i] {
            continue;
        }

        unassigned[i] = false;
        mapping.insert(pool[i].0.clone(), pool[i].0.clone());

        queue.clear();
        queue.push(i);
        while let Some(parent) = queue.pop() {
            let parent_seq = pool[parent].0.as_bytes();
            let parent_count = pool[parent].1;

            for j in (i + 1)..pool.len() {
                if unassigned[j]
                    && pool[j].1 < parent_count / 2 + 1
                    && hamming(parent_seq, pool[j].0.as_bytes()) <= threshold
                {
                    unassigned[j] = false;
                    mapping.insert(pool[j].0.clone(), pool[i].0.clone());
                    queue.push(j);
                }
            }
        }
    }

    mapping
}

/// Edit distance via global alignment, with a shortcut when the length
/// difference alone already exceeds the threshold.
fn alignment_distance(a: &str, b: &str, threshold: usize) -> usize {
    let len_diff = a.len().abs_diff(b.len());
    if len_diff > threshold {
        return len_diff;
    }

    // match scores 1, mismatches and gaps score 0, so the optimal global
    // score is the number of matched bases and max(len) - score is the
    // number of unmatched positions in the longer sequence
    let mut aligner = Aligner::new(0, 0, |x: u8, y: u8| i32::from(x == y));
    let score = aligner.global(a.as_bytes(), b.as_bytes()).score;

    a.len().max(b.len()) - score as usize
}

/// Greedy alignment-based clustering with a read-ratio side-constraint.
///
/// A candidate is absorbed only when it is within the distance threshold and
/// its read count is at most 10% of the seed's, protecting independent
/// high-abundance sequences from being merged into each other. The seed
/// itself always joins its own cluster.
fn cluster_alignment(pool: &[(String, u64)], threshold: usize) -> Mapping {
    let mut mapping = Mapping::default();
    let mut unassigned = vec![true; pool.len()];

    for i in 0..pool.len() {
        if !unassigned[i] {
            continue;
        }

        let (seed, seed_reads) = (&pool[i].0, pool[i].1);
        mapping.insert(seed.clone(), seed.clone());
        unassigned[i] = false;

        for j in (i + 1)..pool.len() {
            if unassigned[j]
                && pool[j].1 * 10 <= seed_reads
                && alignment_distance(seed, &pool[j].0, threshold) <= threshold
            {
                mapping.insert(pool[j].0.clone(), seed.clone());
                unassigned[j] = false;
            }
        }
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn cluster(
        list: &[(&str, u64)],
        threshold: Option<usize>,
        method: ClusterMethod,
        whitelist: Option<&[String]>,
    ) -> Result<Mapping, DenoiseError> {
        let sequences: Vec<String> = list.iter().map(|(s, _)| s.to_string()).collect();
        let reads: Vec<u64> = list.iter().map(|(_, r)| *r).collect();
        cluster_sequences(&sequences, &reads, threshold, method, whitelist)
    }

    #[test]
    fn test_method_tags() {
        assert_eq!("hamming".parse::<ClusterMethod>().unwrap(), ClusterMethod::Hamming);
        assert_eq!("Directional".parse::<ClusterMethod>().unwrap(), ClusterMethod::Directional);
        assert_eq!("alignment".parse::<ClusterMethod>().unwrap(), ClusterMethod::Alignment);

        let err = "umi_tools".parse::<ClusterMethod>().unwrap_err();
        assert!(matches!(err, DenoiseError::InvalidMethod(_)));
    }

    #[test]
    fn test_hamming_merges_within_threshold() {
        let mapping = cluster(
            &[("AAAA", 10), ("AAAT", 3), ("GGGG", 5)],
            Some(1),
            ClusterMethod::Hamming,
            None,
        )
        .unwrap();

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping["AAAA"], "AAAA");
        assert_eq!(mapping["AAAT"], "AAAA");
        assert_eq!(mapping["GGGG"], "GGGG");
    }

    #[test]
    fn test_hamming_threshold_zero_keeps_all_apart() {
        let mapping = cluster(
            &[("AAAA", 10), ("AAAT", 3), ("GGGG", 5)],
            Some(0),
            ClusterMethod::Hamming,
            None,
        )
        .unwrap();

        for (seq, canonical) in &mapping {
            assert_eq!(seq, canonical);
        }
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn test_highest_read_sequence_seeds_first() {
        // AAAT has the most reads so it becomes canonical for AAAA
        let mapping = cluster(
            &[("AAAA", 3), ("AAAT", 10)],
            Some(1),
            ClusterMethod::Hamming,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAA"], "AAAT");
        assert_eq!(mapping["AAAT"], "AAAT");
    }

    #[test]
    fn test_duplicate_sequences_aggregate_reads() {
        // AAAA appears twice for a total of 12 reads, outranking AAAT's 10
        let mapping = cluster(
            &[("AAAA", 6), ("AAAT", 10), ("AAAA", 6)],
            Some(1),
            ClusterMethod::Hamming,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAT"], "AAAA");
    }

    #[test]
    fn test_assigned_sequences_are_never_reseeded() {
        // with threshold 2: CCAA (8 reads) joins AAAA's cluster (distance 2)
        // and must not later seed a cluster absorbing CCCC, even though
        // CCCC is within distance 2 of CCAA
        let mapping = cluster(
            &[("AAAA", 10), ("CCAA", 8), ("CCCC", 1)],
            Some(2),
            ClusterMethod::Hamming,
            None,
        )
        .unwrap();

        assert_eq!(mapping["CCAA"], "AAAA");
        assert_eq!(mapping["CCCC"], "CCCC");
    }

    #[test]
    fn test_threshold_monotonicity() {
        let list = [("AAAA", 10), ("AAAT", 5), ("AATT", 4), ("GGGG", 3), ("GGGT", 2)];

        let mut previous = usize::MAX;
        for threshold in 0..=4 {
            let mapping = cluster(&list, Some(threshold), ClusterMethod::Hamming, None).unwrap();
            let clusters: std::collections::HashSet<&String> = mapping.values().collect();
            assert!(
                clusters.len() <= previous,
                "cluster count increased at threshold {threshold}"
            );
            previous = clusters.len();
        }
    }

    #[test]
    fn test_whitelist_assignment() {
        let whitelist = seqs(&["AAAA", "GGGG"]);
        let mapping = cluster(
            &[("AAAA", 10), ("AAAT", 3), ("CCCC", 5)],
            Some(1),
            ClusterMethod::Hamming,
            Some(&whitelist),
        )
        .unwrap();

        assert_eq!(mapping["AAAA"], "AAAA");
        assert_eq!(mapping["AAAT"], "AAAA");

        // CCCC is distance 4 from both whitelist entries and stays unmapped
        assert!(!mapping.contains_key("CCCC"));
    }

    #[test]
    fn test_whitelist_threshold_zero_exact_matches_only() {
        let whitelist = seqs(&["AAAA"]);
        let mapping = cluster(
            &[("AAAA", 10), ("AAAT", 3)],
            Some(0),
            ClusterMethod::Hamming,
            Some(&whitelist),
        )
        .unwrap();

        assert_eq!(mapping["AAAA"], "AAAA");
        assert!(!mapping.contains_key("AAAT"));
    }

    #[test]
    fn test_whitelist_order_decides_contested_sequences() {
        // AATT is within distance 2 of both entries; the first entry claims it
        let whitelist = seqs(&["AAAA", "TTTT"]);
        let mapping = cluster(&[("AATT", 5)], Some(2), ClusterMethod::Hamming, Some(&whitelist))
            .unwrap();

        assert_eq!(mapping["AATT"], "AAAA");
    }

    #[test]
    fn test_directional_count_gradient() {
        // AAAT (3 reads) is captured by AAAA (10 reads): 3 < 10/2 + 1.
        // GGGT (5 reads) is not captured by GGGG (8 reads): 5 >= 8/2 + 1.
        let mapping = cluster(
            &[("AAAA", 10), ("GGGG", 8), ("GGGT", 5), ("AAAT", 3)],
            Some(1),
            ClusterMethod::Directional,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAT"], "AAAA");
        assert_eq!(mapping["GGGT"], "GGGT");
        assert_eq!(mapping["GGGG"], "GGGG");
    }

    #[test]
    fn test_directional_transitive_capture() {
        // AATT is two substitutions from AAAA but one from AAAT, which is
        // itself captured by AAAA; the chain maps everything to AAAA
        let mapping = cluster(
            &[("AAAA", 20), ("AAAT", 5), ("AATT", 2)],
            Some(1),
            ClusterMethod::Directional,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAT"], "AAAA");
        assert_eq!(mapping["AATT"], "AAAA");
    }

    #[test]
    fn test_directional_default_threshold_from_length() {
        // 10-mers default to a threshold of round(0.1 * 10) = 1
        let mapping = cluster(
            &[("AAAAAAAAAA", 10), ("AAAAAAAAAT", 2)],
            None,
            ClusterMethod::Directional,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAAAAAAAT"], "AAAAAAAAAA");
    }

    #[test]
    fn test_alignment_read_ratio_constraint() {
        // AAAT is within distance 1 but holds 30% of the seed's reads, so it
        // survives as its own cluster; AAAG at 1 read (10%) is absorbed
        let mapping = cluster(
            &[("AAAA", 10), ("AAAT", 3), ("AAAG", 1)],
            Some(1),
            ClusterMethod::Alignment,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAT"], "AAAT");
        assert_eq!(mapping["AAAG"], "AAAA");
        assert_eq!(mapping["AAAA"], "AAAA");
    }

    #[test]
    fn test_alignment_handles_unequal_lengths() {
        // a single-base deletion is distance 1 under global alignment
        let mapping = cluster(
            &[("AAACAAA", 50), ("AAAAAA", 5)],
            Some(1),
            ClusterMethod::Alignment,
            None,
        )
        .unwrap();

        assert_eq!(mapping["AAAAAA"], "AAACAAA");
    }

    #[test]
    fn test_alignment_length_difference_shortcut() {
        assert_eq!(alignment_distance("AAAAAAAA", "AA", 1), 6);
        assert_eq!(alignment_distance("AAAA", "AAAA", 1), 0);
        assert_eq!(alignment_distance("AAAA", "AAAT", 1), 1);
    }

    #[test]
    fn test_read_count_length_mismatch() {
        let result = cluster_sequences(
            &seqs(&["AAAA", "AAAT"]),
            &[1],
            Some(1),
            ClusterMethod::Hamming,
            None,
        );
        assert!(matches!(result, Err(DenoiseError::LengthMismatch(_))));
    }

    #[test]
    fn test_unequal_sequence_lengths_rejected() {
        let result = cluster(
            &[("AAAA", 2), ("AAA", 1)],
            Some(1),
            ClusterMethod::Hamming,
            None,
        );
        assert!(matches!(result, Err(DenoiseError::LengthMismatch(_))));
    }

    #[test]
    fn test_whitelist_incompatible_with_non_hamming() {
        let whitelist = seqs(&["AAAA"]);
        for method in [ClusterMethod::Directional, ClusterMethod::Alignment] {
            let result = cluster(&[("AAAA", 1)], Some(1), method, Some(&whitelist));
            assert!(matches!(result, Err(DenoiseError::IncompatibleOptions(_))));
        }
    }

    #[test]
    fn test_empty_input() {
        for method in [
            ClusterMethod::Hamming,
            ClusterMethod::Directional,
            ClusterMethod::Alignment,
        ] {
            let mapping = cluster_sequences(&[], &[], Some(1), method, None).unwrap();
            assert!(mapping.is_empty());
        }
    }
}
