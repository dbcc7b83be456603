//! IndustryAggregator: equal-weighted industry indices with Mansfield RS.

use super::grouping::{IndustryGroups, Membership};
use super::index::EqualWeightIndex;
use crate::config::FeatureConfig;
use crate::domain::{IndustryFeatureRecord, IndustryLevel, InstrumentFeatures, InstrumentMaster};
use crate::indicators::{mansfield_from_ratios, BenchmarkCloses};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Construction method recorded for the universe benchmark.
pub const UNIVERSE_BENCHMARK_METHOD: &str = "equal_weighted_daily_return_mean_then_cumprod_base_100";

/// Benchmark used for industry relative strength. One choice per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndustryBenchmark {
    /// Equal-weighted index of every non-fund instrument.
    #[default]
    Universe,
    /// The run's fixed benchmark instrument.
    Instrument,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("instrument master is empty")]
    EmptyMaster,

    #[error("instrument master carries no industry classification")]
    MissingClassification,

    #[error("industry level {level} requires parent level {parent} in the same run")]
    MissingParentLevel {
        level: IndustryLevel,
        parent: IndustryLevel,
    },

    #[error("no industry groups at level {0}: every instrument is a fund or the universe is empty")]
    NoIndustries(IndustryLevel),

    /// Non-fatal: relative strength degrades to null.
    #[error("benchmark unavailable: {0}")]
    BenchmarkUnavailable(String),
}

#[derive(Debug, Clone)]
pub struct IndustryAggregator {
    config: FeatureConfig,
}

impl IndustryAggregator {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Equal-weighted whole-universe index, funds excluded.
    pub fn universe_index(
        &self,
        features: &[InstrumentFeatures],
        master: &[InstrumentMaster],
    ) -> EqualWeightIndex {
        let membership = Membership::new(master);
        EqualWeightIndex::build(
            features
                .iter()
                .filter(|f| !membership.is_fund(&f.instrument_id)),
        )
    }

    /// Industry rows for one level, sorted by (large, mid, small, date).
    pub fn build_industry_frame(
        &self,
        features: &[InstrumentFeatures],
        master: &[InstrumentMaster],
        level: IndustryLevel,
        benchmark: Option<&BenchmarkCloses>,
    ) -> Result<Vec<IndustryFeatureRecord>, AggregationError> {
        check_master(master)?;
        let groups = IndustryGroups::build(features, master, level);
        if groups.is_empty() {
            return Err(AggregationError::NoIndustries(level));
        }
        let benchmark = benchmark.filter(|b| !b.is_empty());

        let mut out = Vec::new();
        for group in groups.groups() {
            let index = EqualWeightIndex::build(group.members.iter().map(|&i| &features[i]));
            let n = index.len();

            // Rolling windows run over this group's grid only.
            let (rs, mrs): (Vec<Option<f64>>, Vec<Vec<Option<f64>>>) = match benchmark {
                Some(bench) => {
                    let levels: Vec<Option<f64>> = index.levels.iter().map(|&l| Some(l)).collect();
                    let ratios = bench.ratios(&index.dates, &levels);
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

            for i in 0..n {
                out.push(IndustryFeatureRecord {
                    date: index.dates[i],
                    level,
                    industry_large: group.labels.large.clone(),
                    industry_mid: group.labels.mid.clone(),
                    industry_small: group.labels.small.clone(),
                    industry_key: group.labels.key.clone(),
                    industry_close: index.levels[i],
                    industry_return: index.returns[i],
                    constituent_count: index.constituent_counts[i],
                    mansfield_rs: rs[i],
                    mrs_raw: mrs.iter().map(|col| col[i]).collect(),
                });
            }
        }

        tracing::debug!(industry_level = %level, industries = groups.len(), rows = out.len(), "industry frame built");
        Ok(out)
    }

    /// Industry rows for every requested level, in level order.
    ///
    /// `instrument_benchmark` is the fixed benchmark series; it is only used
    /// with [`IndustryBenchmark::Instrument`].
    pub fn build_levels(
        &self,
        features: &[InstrumentFeatures],
        master: &[InstrumentMaster],
        levels: &[IndustryLevel],
        mode: IndustryBenchmark,
        instrument_benchmark: Option<&BenchmarkCloses>,
    ) -> Result<Vec<IndustryFeatureRecord>, AggregationError> {
        check_levels(levels)?;
        check_master(master)?;

        let universe;
        let benchmark = match mode {
            IndustryBenchmark::Universe => {
                universe = self.universe_index(features, master).to_benchmark();
                Some(&universe)
            }
            IndustryBenchmark::Instrument => instrument_benchmark,
        };

        let mut sorted = levels.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut out = Vec::new();
        for level in sorted {
            out.extend(self.build_industry_frame(features, master, level, benchmark)?);
        }
        Ok(out)
    }
}

/// Every requested level's parents must be requested too.
pub fn check_levels(levels: &[IndustryLevel]) -> Result<(), AggregationError> {
    for &level in levels {
        if let Some(&parent) = level.parents().iter().find(|p| !levels.contains(p)) {
            return Err(AggregationError::MissingParentLevel { level, parent });
        }
    }
    Ok(())
}

fn check_master(master: &[InstrumentMaster]) -> Result<(), AggregationError> {
    if master.is_empty() {
        return Err(AggregationError::EmptyMaster);
    }
    if !master.iter().any(InstrumentMaster::has_classification) {
        return Err(AggregationError::MissingClassification);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DailyBar, FeatureRecord};
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn features(id: &str, rows: &[(u32, i64)]) -> InstrumentFeatures {
        InstrumentFeatures {
            instrument_id: id.into(),
            records: rows
                .iter()
                .map(|&(day, close)| FeatureRecord {
                    instrument_id: id.into(),
                    bar: DailyBar::close_only(d(day), close),
                    moving_averages: vec![],
                    volume_moving_averages: vec![],
                    mansfield_rs: None,
                    is_new_high_1y: None,
                    mrs_raw: vec![],
                })
                .collect(),
        }
    }

    fn row(code: &str, market: &str, large: &str, mid: &str, small: &str) -> InstrumentMaster {
        InstrumentMaster {
            code: code.into(),
            name: code.into(),
            market: market.into(),
            industry_large: large.into(),
            industry_mid: mid.into(),
            industry_small: small.into(),
            shares_outstanding: None,
        }
    }

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            rs_window: 2,
            mrs_windows: vec![crate::config::MrsWindow::new("MRS_2", 2)],
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn rows_sorted_by_labels_then_date() {
        let f = vec![
            features("000001", &[(2, 100), (3, 110)]),
            features("000002", &[(2, 100), (3, 90)]),
        ];
        let m = vec![
            row("000001", "KOSPI", "Tech", "", ""),
            row("000002", "KOSPI", "Banks", "", ""),
        ];
        let agg = IndustryAggregator::new(small_config());
        let out = agg
            .build_industry_frame(&f, &m, IndustryLevel::Large, None)
            .unwrap();
        let keys: Vec<(&str, NaiveDate)> =
            out.iter().map(|r| (r.industry_key.as_str(), r.date)).collect();
        assert_eq!(
            keys,
            vec![("Banks", d(2)), ("Banks", d(3)), ("Tech", d(2)), ("Tech", d(3))]
        );
        assert!(out.iter().all(|r| r.mansfield_rs.is_none()));
    }

    #[test]
    fn fund_only_universe_has_no_industries() {
        let f = vec![features("069500", &[(2, 100)])];
        let m = vec![row("069500", "ETF", "x", "", "")];
        let agg = IndustryAggregator::new(small_config());
        assert_eq!(
            agg.build_industry_frame(&f, &m, IndustryLevel::Large, None),
            Err(AggregationError::NoIndustries(IndustryLevel::Large))
        );
    }

    #[test]
    fn master_without_classification_fails() {
        let f = vec![features("000001", &[(2, 100)])];
        let m = vec![row("000001", "KOSPI", "", "nan", "")];
        let agg = IndustryAggregator::new(small_config());
        assert_eq!(
            agg.build_industry_frame(&f, &m, IndustryLevel::Large, None),
            Err(AggregationError::MissingClassification)
        );
        assert_eq!(
            agg.build_industry_frame(&f, &[], IndustryLevel::Large, None),
            Err(AggregationError::EmptyMaster)
        );
    }

    #[test]
    fn finest_level_requires_parents() {
        assert_eq!(
            check_levels(&[IndustryLevel::LargeMidSmall]),
            Err(AggregationError::MissingParentLevel {
                level: IndustryLevel::LargeMidSmall,
                parent: IndustryLevel::Large,
            })
        );
        assert_eq!(
            check_levels(&[IndustryLevel::Large, IndustryLevel::LargeMidSmall]),
            Err(AggregationError::MissingParentLevel {
                level: IndustryLevel::LargeMidSmall,
                parent: IndustryLevel::LargeMid,
            })
        );
        assert!(check_levels(&IndustryLevel::ALL).is_ok());
    }

    #[test]
    fn single_industry_against_universe_is_flat() {
        // Universe and industry share constituents, so their ratio is constant.
        let f = vec![
            features("000001", &[(2, 100), (3, 110), (4, 99)]),
            features("000002", &[(2, 10), (3, 12), (4, 12)]),
        ];
        let m = vec![
            row("000001", "KOSPI", "Tech", "A", "x"),
            row("000002", "KOSPI", "Tech", "B", "y"),
        ];
        let agg = IndustryAggregator::new(small_config());
        let out = agg
            .build_levels(&f, &m, &IndustryLevel::ALL, IndustryBenchmark::Universe, None)
            .unwrap();
        let large: Vec<_> = out.iter().filter(|r| r.level == IndustryLevel::Large).collect();
        assert_eq!(large.len(), 3);
        assert!(large[0].mansfield_rs.is_none());
        assert!(large[1..]
            .iter()
            .all(|r| r.mansfield_rs.unwrap().abs() < 1e-9));
        // L rows precede LM rows precede LMS rows
        let levels: Vec<IndustryLevel> = out.iter().map(|r| r.level).collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
    }

    #[test]
    fn instrument_mode_without_benchmark_gives_null_rs() {
        let f = vec![features("000001", &[(2, 100), (3, 110), (4, 120)])];
        let m = vec![row("000001", "KOSPI", "Tech", "", "")];
        let agg = IndustryAggregator::new(small_config());
        let out = agg
            .build_levels(&f, &m, &[IndustryLevel::Large], IndustryBenchmark::Instrument, None)
            .unwrap();
        assert!(out.iter().all(|r| r.mansfield_rs.is_none()));
        assert!(out.iter().all(|r| r.mrs_raw == vec![None]));
    }

    #[test]
    fn instrument_mode_measures_against_the_fixed_benchmark() {
        let f = vec![
            features("000001", &[(2, 100), (3, 110), (4, 121)]),
            features("000002", &[(2, 50), (3, 50), (4, 40)]),
        ];
        let m = vec![
            row("000001", "KOSPI", "Tech", "", ""),
            row("000002", "KOSPI", "Banks", "", ""),
        ];
        let bench = BenchmarkCloses::from_pairs([(d(2), 50.0), (d(3), 55.0), (d(4), 50.0)]);
        let agg = IndustryAggregator::new(small_config());
        let out = agg
            .build_levels(
                &f,
                &m,
                &[IndustryLevel::Large],
                IndustryBenchmark::Instrument,
                Some(&bench),
            )
            .unwrap();
        assert_eq!(out.len(), 6);

        for group in out.chunks(3) {
            let ratios: Vec<f64> = group
                .iter()
                .zip([50.0, 55.0, 50.0])
                .map(|(r, b)| r.industry_close / b)
                .collect();
            assert!(group[0].mansfield_rs.is_none());
            for i in 1..3 {
                let sma = (ratios[i - 1] + ratios[i]) / 2.0;
                let expected = (ratios[i] / sma - 1.0) * 100.0;
                assert_approx(group[i].mansfield_rs.unwrap(), expected, DEFAULT_EPSILON);
                assert_approx(group[i].mrs_raw[0].unwrap(), expected, DEFAULT_EPSILON);
            }
        }
        // Tech outran the benchmark on day 3, Banks lagged it.
        let tech = out.iter().find(|r| r.industry_key == "Tech" && r.date == d(3)).unwrap();
        let banks = out.iter().find(|r| r.industry_key == "Banks" && r.date == d(3)).unwrap();
        assert!(tech.mansfield_rs.unwrap() > banks.mansfield_rs.unwrap());
    }
}
