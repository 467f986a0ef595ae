//! Line-sequence similarity ratio.
//!
//! Matched-block similarity between two line sequences: the classic
//! `2*M / T` ratio where `M` is the total length of the longest matching
//! blocks (found recursively left and right of each match) and `T` the
//! combined length of both sequences. Order-sensitive by construction.

use std::collections::HashMap;

/// Similarity ratio in [0, 1] between two line sequences.
///
/// Two empty sequences are identical (ratio 1.0).
pub fn sequence_ratio(a: &[String], b: &[String]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut b2j: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, line) in b.iter().enumerate() {
        b2j.entry(line.as_str()).or_default().push(j);
    }

    let mut matches = 0usize;
    let mut pending = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if size > 0 {
            matches += size;
            pending.push((alo, i, blo, j));
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    2.0 * matches as f64 / total as f64
}

/// Longest block of lines common to `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Returns `(i, j, size)` such that `a[i..i+size] == b[j..j+size]`,
/// preferring the earliest block on ties.
fn longest_match(
    a: &[String],
    b2j: &HashMap<&str, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
    // j2len[j] = length of the match ending at a[i], b[j].
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for i in alo..ahi {
        let mut row: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(a[i].as_str()) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let len = if j == 0 {
                    1
                } else {
                    j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                };
                row.insert(j, len);
                if len > best_size {
                    best_i = i + 1 - len;
                    best_j = j + 1 - len;
                    best_size = len;
                }
            }
        }
        j2len = row;
    }

    (best_i, best_j, best_size)
}
