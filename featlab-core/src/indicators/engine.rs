//! IndicatorEngine: per-instrument feature computation.

use super::mansfield::{mansfield_from_ratios, BenchmarkCloses};
use super::new_high::new_high_flags;
use super::sma::Sma;
use super::Indicator;
use crate::config::{ConfigError, FeatureConfig};
use crate::domain::{
    DailyBar, DataShapeError, FeatureRecord, InstrumentFeatures, InstrumentSeries,
};
use chrono::NaiveDate;

/// Computes the feature columns of one standardized series.
///
/// Holds only the immutable configuration, so one engine is shared by every
/// worker of a run.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    config: FeatureConfig,
    price_averages: Vec<Sma>,
    volume_averages: Vec<Sma>,
}

impl IndicatorEngine {
    pub fn new(config: FeatureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let price_averages = config.ma_windows.iter().map(|&w| Sma::new(w)).collect();
        let volume_averages = config
            .volume_ma_windows
            .iter()
            .map(|&w| Sma::volume(w))
            .collect();
        Ok(Self {
            config,
            price_averages,
            volume_averages,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Compute features for `series`.
    ///
    /// A missing (or empty) benchmark leaves every relative-strength value
    /// null. Fails only when the series breaks the standardized shape.
    pub fn compute_features(
        &self,
        series: &InstrumentSeries,
        benchmark: Option<&BenchmarkCloses>,
    ) -> Result<InstrumentFeatures, DataShapeError> {
        series.check_shape()?;
        let n = series.len();

        let closes: Vec<f64> = series.closes();
        let close_values: Vec<Option<f64>> = closes.iter().map(|&c| Some(c)).collect();
        let volumes: Vec<Option<f64>> = series.bars.iter().map(DailyBar::volume_f64).collect();

        let moving_averages: Vec<Vec<Option<f64>>> = self
            .price_averages
            .iter()
            .map(|sma| windowed(sma, &close_values))
            .collect();
        let volume_averages: Vec<Vec<Option<f64>>> = self
            .volume_averages
            .iter()
            .map(|sma| windowed(sma, &volumes))
            .collect();

        let benchmark = benchmark.filter(|b| !b.is_empty());
        let (mansfield, mrs): (Vec<Option<f64>>, Vec<Vec<Option<f64>>>) = match benchmark {
            Some(bench) => {
                let dates: Vec<NaiveDate> = series.dates().collect();
                let ratios = bench.ratios(&dates, &close_values);
                (
                    mansfield_from_ratios(&ratios, self.config.rs_window),
                    self.config
                        .mrs_windows
                        .iter()
                        .map(|m| mansfield_from_ratios(&ratios, m.window))
                        .collect(),
                )
            }
            None => (
                vec![None; n],
                vec![vec![None; n]; self.config.mrs_windows.len()],
            ),
        };

        let new_highs = new_high_flags(&closes, self.config.new_high_window);

        let records = series
            .bars
            .iter()
            .enumerate()
            .map(|(i, bar)| FeatureRecord {
                instrument_id: series.instrument_id.clone(),
                bar: bar.clone(),
                moving_averages: moving_averages.iter().map(|col| col[i]).collect(),
                volume_moving_averages: volume_averages.iter().map(|col| col[i]).collect(),
                mansfield_rs: mansfield[i],
                is_new_high_1y: new_highs[i],
                mrs_raw: mrs.iter().map(|col| col[i]).collect(),
            })
            .collect();

        Ok(InstrumentFeatures {
            instrument_id: series.instrument_id.clone(),
            records,
        })
    }
}

/// Run `indicator`, skipping the computation when the series is too short
/// to produce a single defined value.
fn windowed(indicator: &impl Indicator, values: &[Option<f64>]) -> Vec<Option<f64>> {
    if values.len() <= indicator.lookback() {
        return vec![None; values.len()];
    }
    indicator.compute(values)
}
