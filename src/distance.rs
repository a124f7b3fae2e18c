//! Pairwise sequence distances.
//!
//! Sequences are partitioned into consecutive k-length chunks and compared
//! chunk-wise, so k = 1 gives the plain per-base Hamming distance while larger
//! k counts the number of differing k-mers. All sequences must be of equal
//! length; this is exact and quadratic in the number of sequences.

use crate::error::DenoiseError;

/// Partition a sequence into consecutive k-length chunks.
///
/// A trailing chunk shorter than k is dropped, e.g. `ABCDE` with k = 2 gives
/// `["AB", "CD"]`.
pub fn seq_partition(seq: &str, k: usize) -> Vec<&str> {
    assert!(k >= 1, "partition width must be >= 1");

    seq.as_bytes()
        .chunks_exact(k)
        .map(|chunk| std::str::from_utf8(chunk).expect("sequence is not ASCII"))
        .collect()
}

/// Hamming distance between two equal-length byte sequences.
pub(crate) fn hamming(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
}

/// Verify all sequences share one length and return it (None if empty).
pub(crate) fn common_length<'a, I>(seqs: I) -> Result<Option<usize>, DenoiseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut length = None;
    for seq in seqs {
        match length {
            None => length = Some(seq.len()),
            Some(len) if len != seq.len() => {
                return Err(DenoiseError::LengthMismatch(format!(
                    "sequences of length {} and {} cannot be compared",
                    len,
                    seq.len()
                )));
            }
            Some(_) => {}
        }
    }

    Ok(length)
}

/// Distance matrix between source and target sequences in k-mer space.
///
/// Entry (i, j) is the number of differing k-length chunks between source
/// sequence i and target sequence j. When no target list is given the source
/// list is compared against itself, giving a symmetric matrix with a zero
/// diagonal.
pub fn kmer_hamming_matrix(
    source: &[String],
    target: Option<&[String]>,
    k: usize,
) -> Result<Vec<Vec<u32>>, DenoiseError> {
    let target = target.unwrap_or(source);

    common_length(
        source
            .iter()
            .map(String::as_str)
            .chain(target.iter().map(String::as_str)),
    )?;

    let source_chunks: Vec<Vec<&str>> = source.iter().map(|s| seq_partition(s, k)).collect();
    let target_chunks: Vec<Vec<&str>> = target.iter().map(|s| seq_partition(s, k)).collect();

    let matrix = source_chunks
        .iter()
        .map(|row| {
            target_chunks
                .iter()
                .map(|col| row.iter().zip(col.iter()).filter(|(a, b)| a != b).count() as u32)
                .collect()
        })
        .collect();

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seq_partition() {
        assert_eq!(seq_partition("ABCDEF", 1), vec!["A", "B", "C", "D", "E", "F"]);
        assert_eq!(seq_partition("ABCDEF", 2), vec!["AB", "CD", "EF"]);
        assert_eq!(seq_partition("ABCDEF", 3), vec!["ABC", "DEF"]);

        // trailing incomplete chunk is dropped
        assert_eq!(seq_partition("ABCDE", 2), vec!["AB", "CD"]);
    }

    #[test]
    fn test_hamming() {
        assert_eq!(hamming(b"AAAA", b"AAAA"), 0);
        assert_eq!(hamming(b"AAAA", b"AAAT"), 1);
        assert_eq!(hamming(b"AAAA", b"GGGG"), 4);
    }

    #[test]
    fn test_self_matrix() {
        let matrix = kmer_hamming_matrix(&seqs(&["AAAA", "AAAT", "GGGG"]), None, 1).unwrap();

        assert_eq!(matrix.len(), 3);
        for (i, row) in matrix.iter().enumerate() {
            assert_eq!(row[i], 0);
        }

        assert_eq!(matrix[0][1], 1);
        assert_eq!(matrix[1][0], 1);
        assert_eq!(matrix[0][2], 4);
        assert_eq!(matrix[1][2], 4);
    }

    #[test]
    fn test_source_target_matrix() {
        let source = seqs(&["AAAA", "CCCC"]);
        let target = seqs(&["AACC"]);
        let matrix = kmer_hamming_matrix(&source, Some(&target), 1).unwrap();

        assert_eq!(matrix, vec![vec![2], vec![2]]);
    }

    #[test]
    fn test_kmer_space() {
        // in 2-mer space AACC vs AATT differ by one chunk, not two bases
        let source = seqs(&["AACC"]);
        let target = seqs(&["AATT"]);

        let per_base = kmer_hamming_matrix(&source, Some(&target), 1).unwrap();
        assert_eq!(per_base[0][0], 2);

        let per_2mer = kmer_hamming_matrix(&source, Some(&target), 2).unwrap();
        assert_eq!(per_2mer[0][0], 1);
    }

    #[test]
    fn test_empty_input() {
        let matrix = kmer_hamming_matrix(&[], None, 1).unwrap();
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_unequal_lengths_rejected() {
        let result = kmer_hamming_matrix(&seqs(&["AAAA", "AAA"]), None, 1);
        assert!(matches!(result, Err(DenoiseError::LengthMismatch(_))));

        let result = kmer_hamming_matrix(&seqs(&["AAAA"]), Some(&seqs(&["AAAAA"])), 1);
        assert!(matches!(result, Err(DenoiseError::LengthMismatch(_))));
    }
}
