//! One-year new-high flag.
//!
//! True when the close equals the highest close of the trailing window
//! (today included). Undefined until the window has filled.

use super::rolling::rolling_max;

pub fn new_high_flags(closes: &[f64], window: usize) -> Vec<Option<bool>> {
    rolling_max(closes, window)
        .into_iter()
        .zip(closes)
        .map(|(max, &close)| max.map(|m| close == m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_until_window_fills() {
        let flags = new_high_flags(&[1.0, 2.0, 3.0], 3);
        assert_eq!(flags, vec![None, None, Some(true)]);
    }

    #[test]
    fn strictly_increasing_is_always_new_high() {
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        let flags = new_high_flags(&closes, 5);
        assert!(flags[4..].iter().all(|f| *f == Some(true)));
    }

    #[test]
    fn spike_blocks_new_highs_until_it_leaves_the_window() {
        let closes = [10.0, 50.0, 11.0, 12.0, 13.0, 14.0];
        let flags = new_high_flags(&closes, 3);
        assert_eq!(flags[2], Some(false));
        assert_eq!(flags[3], Some(false));
        assert_eq!(flags[4], Some(true));
    }
}
