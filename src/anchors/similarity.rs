//! Fuzzy label similarity

use std::collections::{HashMap, VecDeque};

/// Score given to a label found verbatim inside a longer text
pub const SUBSTRING_SCORE: f64 = 0.95;

/// Trim, lowercase and collapse whitespace runs to a single space
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`
///
/// Returns `(i, j, size)`. Among blocks of equal size the one starting
/// earliest in `a`, then earliest in `b`, wins.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // j -> length of the match ending at (i - 1, j)
    let mut lengths: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_lengths = HashMap::new();
        for &j in b2j.get(c).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }
            let k = j
                .checked_sub(1)
                .and_then(|prev| lengths.get(&prev))
                .copied()
                .unwrap_or(0)
                + 1;
            next_lengths.insert(j, k);
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        lengths = next_lengths;
    }

    (best_i, best_j, best_size)
}

/// Total size of the matching blocks found by recursive longest-match
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut total = 0;
    let mut queue = VecDeque::from([((0, a.len()), (0, b.len()))]);
    while let Some(((alo, ahi), (blo, bhi))) = queue.pop_front() {
        let (i, j, size) = longest_match(a, &b2j, (alo, ahi), (blo, bhi));
        if size == 0 {
            continue;
        }
        total += size;
        if alo < i && blo < j {
            queue.push_back(((alo, i), (blo, j)));
        }
        if i + size < ahi && j + size < bhi {
            queue.push_back(((i + size, ahi), (j + size, bhi)));
        }
    }
    total
}

/// Sequence-matcher ratio `2 * matches / (len(a) + len(b))` of normalized text
///
/// Returns 0 when either side is empty.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / (a.len() + b.len()) as f64
}

/// How well `text` matches an already normalized label
pub fn score(label: &str, text: &str) -> f64 {
    let base = ratio(label, text);
    if !label.is_empty() && normalize(text).contains(label) {
        base.max(SUBSTRING_SCORE)
    } else {
        base
    }
}
