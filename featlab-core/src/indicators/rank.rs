//! Cross-sectional percentile rank.
//!
//! Each present value maps to `average_rank / count * 100`, rounded to two
//! decimals, where ties share the mean of the ranks they span. Missing values
//! are excluded from the count and stay missing.

use std::cmp::Ordering;

pub fn percentile_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|x| !x.is_nan()).map(|x| (i, x)))
        .collect();
    let mut out = vec![None; values.len()];
    let count = present.len();
    if count == 0 {
        return out;
    }

    present.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let mut start = 0;
    while start < count {
        let mut end = start + 1;
        while end < count && present[end].1 == present[start].1 {
            end += 1;
        }
        // 1-based ranks start+1 ..= end share their mean.
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let pct = round2(average_rank / count as f64 * 100.0);
        for &(i, _) in &present[start..end] {
            out[i] = Some(pct);
        }
        start = end;
    }
    out
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_values() {
        let out = percentile_ranks(&[Some(3.0), Some(1.0), Some(2.0)]);
        assert_eq!(out, vec![Some(100.0), Some(33.33), Some(66.67)]);
    }

    #[test]
    fn ties_share_average_rank() {
        let out = percentile_ranks(&[Some(1.0), Some(1.0), Some(2.0), Some(3.0)]);
        // ranks 1 and 2 average to 1.5 of 4
        assert_eq!(out, vec![Some(37.5), Some(37.5), Some(75.0), Some(100.0)]);
    }

    #[test]
    fn missing_values_are_skipped() {
        let out = percentile_ranks(&[None, Some(5.0), None, Some(-1.0)]);
        assert_eq!(out, vec![None, Some(100.0), None, Some(50.0)]);
    }

    #[test]
    fn single_value_is_top() {
        assert_eq!(percentile_ranks(&[Some(-7.0)]), vec![Some(100.0)]);
        assert_eq!(percentile_ranks(&[]), Vec::<Option<f64>>::new());
    }
}
