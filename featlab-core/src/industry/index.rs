//! Equal-weighted index construction.
//!
//! Daily returns are taken on each constituent's own date grid, then averaged
//! per date over the constituents that have one. Dates in the union grid with
//! no constituent return contribute 0, so the index has no gaps. The level
//! starts at 100 on the first grid date.

use crate::domain::InstrumentFeatures;
use crate::indicators::BenchmarkCloses;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const INDEX_BASE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EqualWeightIndex {
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<f64>,
    pub constituent_counts: Vec<u32>,
    pub levels: Vec<f64>,
}

impl EqualWeightIndex {
    pub fn build<'a>(constituents: impl IntoIterator<Item = &'a InstrumentFeatures>) -> Self {
        // date -> (sum of returns, count of returns)
        let mut grid: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
        for f in constituents {
            let mut previous: Option<f64> = None;
            for r in &f.records {
                let close = r.bar.close_f64();
                let slot = grid.entry(r.bar.date).or_insert((0.0, 0));
                if let Some(prev) = previous {
                    let ret = close / prev - 1.0;
                    if ret.is_finite() {
                        slot.0 += ret;
                        slot.1 += 1;
                    }
                }
                previous = Some(close);
            }
        }

        let mut index = Self::default();
        let mut level = INDEX_BASE;
        for (date, (sum, count)) in grid {
            let ret = if count == 0 { 0.0 } else { sum / f64::from(count) };
            level *= 1.0 + ret;
            index.dates.push(date);
            index.returns.push(ret);
            index.constituent_counts.push(count);
            index.levels.push(level);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Index levels as a benchmark lookup.
    pub fn to_benchmark(&self) -> BenchmarkCloses {
        BenchmarkCloses::from_pairs(self.dates.iter().copied().zip(self.levels.iter().copied()))
    }
}
