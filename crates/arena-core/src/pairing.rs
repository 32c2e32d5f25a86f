//! Round-robin pairing
//!
//! Every unordered pair of distinct participants meets exactly once. Pairs
//! are numbered in colexicographic order, so match `i` can be computed on
//! its own in O(1) without materializing the schedule:
//!
//! ```text
//! rank = C(b, 2) + a = b·(b−1)/2 + a,   a < b
//! ```
//!
//! Rank order is the canonical order of a tournament's matches: reports list
//! matches in it no matter which worker ran them.

/// Number of matches in a round robin over `n` participants.
pub fn match_count(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        n * (n - 1) / 2
    }
}

/// Participants `(a, b)` with `a < b` meeting in match `index`, or `None`
/// past the end of the schedule.
pub fn pairing_for_match(n: usize, index: usize) -> Option<(usize, usize)> {
    if index >= match_count(n) {
        return None;
    }
    Some(unrank_pair(index as u64))
}

/// The full schedule in canonical order.
pub fn round_robin_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..match_count(n)).map(|rank| unrank_pair(rank as u64)).collect()
}

/// Colexicographic unranking: rank → (a, b) with a < b.
fn unrank_pair(rank: u64) -> (usize, usize) {
    // Estimate b via integer floor(sqrt(1 + 8·rank))
    let val = 1 + 8 * rank;
    let mut s = val;
    let mut t = s.div_ceil(2);
    while t < s {
        s = t;
        t = (s + val / s) / 2;
    }
    let mut b = (1 + s) / 2;

    // Correct the estimate
    while b > 0 && b * (b - 1) / 2 > rank {
        b -= 1;
    }
    while (b + 1) * b / 2 <= rank {
        b += 1;
    }

    let a = rank - b * (b - 1) / 2;
    (a as usize, b as usize)
}
