//! The universe feature table: every instrument's feature records plus the
//! cross-sectional multi-timeframe percentile ranks.

use chrono::NaiveDate;
use featlab_core::config::FeatureConfig;
use featlab_core::domain::{FeatureRecord, InstrumentFeatures};
use featlab_core::indicators::percentile_ranks;
use std::collections::BTreeMap;

/// Fixed leading columns of the exported table.
pub const BASE_COLUMNS: [&str; 9] = [
    "Date",
    "Ticker",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "TradingValue",
    "Change",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub record: FeatureRecord,
    /// Percentile rank per multi-timeframe window, aligned with
    /// `FeatureConfig::mrs_windows`.
    pub mrs_percentiles: Vec<Option<f64>>,
}

/// Rows ordered by instrument id, then date.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub config: FeatureConfig,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Concatenate per-instrument features in the order given and rank the
    /// raw multi-timeframe values within each date.
    pub fn assemble(config: FeatureConfig, instruments: &[InstrumentFeatures]) -> Self {
        let mut rows: Vec<FeatureRow> = instruments
            .iter()
            .flat_map(|f| f.records.iter())
            .map(|record| FeatureRow {
                record: record.clone(),
                mrs_percentiles: vec![None; config.mrs_windows.len()],
            })
            .collect();

        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (i, row) in rows.iter().enumerate() {
            by_date.entry(row.record.bar.date).or_default().push(i);
        }
        for k in 0..config.mrs_windows.len() {
            for indices in by_date.values() {
                let raw: Vec<Option<f64>> = indices
                    .iter()
                    .map(|&i| rows[i].record.mrs_raw.get(k).copied().flatten())
                    .collect();
                for (&i, rank) in indices.iter().zip(percentile_ranks(&raw)) {
                    rows[i].mrs_percentiles[k] = rank;
                }
            }
        }

        Self { config, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exported column names, in order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.config.feature_names());
        columns
    }

    /// Distinct instrument ids in table order.
    pub fn instrument_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for row in &self.rows {
            if ids.last() != Some(&row.record.instrument_id) {
                ids.push(row.record.instrument_id.clone());
            }
        }
        ids
    }

    /// blake3 over every exported value. Equal tables hash equal regardless of
    /// how the run that produced them was scheduled.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for column in self.columns() {
            hasher.update(column.as_bytes());
            hasher.update(&[0]);
        }
        let opt_i64 = |h: &mut blake3::Hasher, v: Option<i64>| match v {
            Some(x) => {
                h.update(&[1]);
                h.update(&x.to_le_bytes());
            }
            None => {
                h.update(&[0]);
            }
        };
        let opt_f64 = |h: &mut blake3::Hasher, v: Option<f64>| match v {
            Some(x) => {
                h.update(&[1]);
                h.update(&x.to_bits().to_le_bytes());
            }
            None => {
                h.update(&[0]);
            }
        };
        for row in &self.rows {
            let r = &row.record;
            hasher.update(r.bar.date.to_string().as_bytes());
            hasher.update(r.instrument_id.as_bytes());
            hasher.update(&[0]);
            opt_i64(&mut hasher, r.bar.open);
            opt_i64(&mut hasher, r.bar.high);
            opt_i64(&mut hasher, r.bar.low);
            opt_i64(&mut hasher, Some(r.bar.close));
            opt_i64(&mut hasher, r.bar.volume);
            opt_i64(&mut hasher, r.bar.trading_value);
            opt_f64(&mut hasher, r.bar.change);
            for &v in r.moving_averages.iter().chain(&r.volume_moving_averages) {
                opt_f64(&mut hasher, v);
            }
            opt_f64(&mut hasher, r.mansfield_rs);
            opt_i64(&mut hasher, r.is_new_high_1y.map(i64::from));
            for &v in &row.mrs_percentiles {
                opt_f64(&mut hasher, v);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}
