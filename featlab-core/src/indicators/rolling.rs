//! Trailing-window primitives shared by every indicator.
//!
//! A window value is defined only when the window is full and every value in
//! it is present.

use std::collections::VecDeque;

/// Trailing mean over `window` values.
///
/// Incremental sum, resynchronised once per window length so rounding error
/// cannot accumulate over long series.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if window == 0 || n < window {
        return out;
    }

    let mut sum = 0.0;
    let mut nulls = 0usize;
    for i in 0..n {
        match values[i] {
            Some(v) => sum += v,
            None => nulls += 1,
        }
        if i >= window {
            match values[i - window] {
                Some(v) => sum -= v,
                None => nulls -= 1,
            }
        }
        if i + 1 < window {
            continue;
        }
        if (i + 1) % window == 0 {
            sum = values[i + 1 - window..=i].iter().flatten().sum();
        }
        if nulls == 0 {
            out[i] = Some(sum / window as f64);
        }
    }
    out
}

/// Trailing maximum over `window` values (monotonic deque, O(n)).
pub fn rolling_max(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if window == 0 || n < window {
        return out;
    }

    // Indices whose values are strictly decreasing front to back.
    let mut deque: VecDeque<usize> = VecDeque::with_capacity(window);
    for i in 0..n {
        while deque.back().is_some_and(|&j| values[j] <= values[i]) {
            deque.pop_back();
        }
        deque.push_back(i);
        if deque.front().is_some_and(|&j| j + window <= i) {
            deque.pop_front();
        }
        if i + 1 >= window {
            out[i] = deque.front().map(|&j| values[j]);
        }
    }
    out
}
