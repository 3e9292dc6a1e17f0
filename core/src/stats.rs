//! Order statistics shared by the threshold calculator, the quantile
//! scorer and the persona cascade.
//!
//! Two primitives:
//!   - `percentile`: one cut value over a population, nearest-rank or
//!     linear interpolation (applied uniformly for every percentile in a run).
//!   - `quantile_scores`: equal-population binning with tie-grouping.
//!     Items with equal keys always land in the same bin.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PercentileMethod {
    /// Smallest value whose rank is at least `q * n` (1-based ranks).
    NearestRank,
    /// Linear interpolation between closest ranks at position `q * (n - 1)`.
    Linear,
}

/// The `q`-th percentile of `values`, or `None` when fewer than two values
/// are present (a percentile of zero or one observations is undefined).
pub fn percentile(values: &[f64], q: f64, method: PercentileMethod) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(percentile_of_sorted(&sorted, q, method))
}

/// Same as `percentile` for an already ascending, non-empty slice.
pub fn percentile_of_sorted(sorted: &[f64], q: f64, method: PercentileMethod) -> f64 {
    let n = sorted.len();
    match method {
        PercentileMethod::NearestRank => sorted[nearest_rank_index(n, q)],
        PercentileMethod::Linear => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn nearest_rank_index(len: usize, q: f64) -> usize {
    if len <= 1 || q <= 0.0 {
        return 0;
    }
    if q >= 1.0 {
        return len - 1;
    }
    ((q * len as f64).ceil() as usize)
        .saturating_sub(1)
        .min(len - 1)
}

/// Bin (1-based) of a 0-based ascending position when `n` items are split
/// into `bins` groups as equal as possible. The remainder `n % bins` goes to
/// the lowest-numbered bins, one extra item each.
///
/// With fewer items than bins the positions are spread over the whole
/// `1..=bins` range instead: the highest position always takes the top bin
/// and, from two items on, the lowest takes bin 1.
pub fn bin_for_position(position: usize, n: usize, bins: usize) -> usize {
    debug_assert!(position < n && bins > 0);
    if n < bins {
        if n == 1 {
            return bins;
        }
        // Round-half-up of position * (bins - 1) / (n - 1).
        let span = n - 1;
        return (2 * position * (bins - 1) + span) / (2 * span) + 1;
    }
    let base = n / bins;
    let rem = n % bins;
    let big = rem * (base + 1);
    if position < big {
        position / (base + 1) + 1
    } else {
        rem + (position - big) / base + 1
    }
}

/// Score every item 1..=`bins` by ascending key: the lowest keys get 1,
/// the highest get `bins`.
///
/// Ranking is tie-grouped: every member of a run of equal keys takes the
/// bin of the run's first (lowest) position, so insertion order never
/// changes a score. With fewer items than bins the scores are spread out
/// (see `bin_for_position`), so a small population still reaches 5.
pub fn quantile_scores<K, F>(keys: &[K], bins: u8, cmp: F) -> Vec<u8>
where
    F: Fn(&K, &K) -> Ordering,
{
    let n = keys.len();
    let mut scores = vec![0u8; n];
    if n == 0 {
        return scores;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| cmp(&keys[a], &keys[b]));

    let mut group_start = 0;
    while group_start < n {
        let mut group_end = group_start + 1;
        while group_end < n
            && cmp(&keys[order[group_start]], &keys[order[group_end]]) == Ordering::Equal
        {
            group_end += 1;
        }
        let score = bin_for_position(group_start, n, bins as usize) as u8;
        for &idx in &order[group_start..group_end] {
            scores[idx] = score;
        }
        group_start = group_end;
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_undefined_below_two_values() {
        assert_eq!(percentile(&[], 0.9, PercentileMethod::Linear), None);
        assert_eq!(percentile(&[42.0], 0.9, PercentileMethod::NearestRank), None);
    }

    #[test]
    fn linear_interpolates_between_ranks() {
        let values = [10.0, 20.0, 30.0, 40.0];
        // position 0.5 * 3 = 1.5 → halfway between 20 and 30
        assert_eq!(percentile(&values, 0.5, PercentileMethod::Linear), Some(25.0));
    }

    #[test]
    fn nearest_rank_picks_an_observed_value() {
        let values = [40.0, 10.0, 30.0, 20.0];
        // ceil(0.5 * 4) = 2nd smallest
        assert_eq!(percentile(&values, 0.5, PercentileMethod::NearestRank), Some(20.0));
        assert_eq!(percentile(&values, 0.9, PercentileMethod::NearestRank), Some(40.0));
    }

    #[test]
    fn remainder_goes_to_lowest_bins() {
        // 7 items into 5 bins: sizes 2,2,1,1,1
        let bins: Vec<usize> = (0..7).map(|p| bin_for_position(p, 7, 5)).collect();
        assert_eq!(bins, vec![1, 1, 2, 2, 3, 4, 5]);
    }

    #[test]
    fn even_split_when_divisible() {
        let bins: Vec<usize> = (0..10).map(|p| bin_for_position(p, 10, 5)).collect();
        assert_eq!(bins, vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
    }

    #[test]
    fn ties_share_a_score() {
        let keys = [5.0, 1.0, 5.0, 3.0, 5.0, 2.0, 4.0, 5.0, 0.0, 6.0];
        let scores = quantile_scores(&keys, 5, |a: &f64, b: &f64| a.total_cmp(b));
        let fives: Vec<u8> = keys
            .iter()
            .zip(&scores)
            .filter(|(k, _)| **k == 5.0)
            .map(|(_, s)| *s)
            .collect();
        assert!(fives.windows(2).all(|w| w[0] == w[1]), "tied keys split: {fives:?}");
        assert_eq!(scores[9], 5, "largest key must score 5");
        assert_eq!(scores[8], 1, "smallest key must score 1");
    }

    #[test]
    fn small_population_spans_every_score() {
        let scores = quantile_scores(&[30, 10, 20], 5, |a: &i32, b: &i32| a.cmp(b));
        assert_eq!(scores, vec![5, 1, 3]);

        let four: Vec<usize> = (0..4).map(|p| bin_for_position(p, 4, 5)).collect();
        assert_eq!(four, vec![1, 2, 4, 5]);
        assert_eq!(bin_for_position(0, 2, 5), 1);
        assert_eq!(bin_for_position(1, 2, 5), 5);
        assert_eq!(bin_for_position(0, 1, 5), 5, "a lone item takes the top bin");
    }
}
