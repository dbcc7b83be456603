//! Indicator configuration.
//!
//! One immutable `FeatureConfig` is built per run and shared by every worker;
//! nothing in the engine reads process-wide state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const MA_WINDOWS: [usize; 6] = [5, 10, 20, 60, 120, 200];
pub const VMA_WINDOWS: [usize; 3] = [5, 20, 60];
pub const MANSFIELD_RS_SMA_WINDOW: usize = 200;
pub const NEW_HIGH_WINDOW_TRADING_DAYS: usize = 252;

/// A named multi-timeframe Mansfield window (e.g. `MRS_60` over 60 days).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrsWindow {
    pub name: String,
    pub window: usize,
}

impl MrsWindow {
    pub fn new(name: impl Into<String>, window: usize) -> Self {
        Self {
            name: name.into(),
            window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub ma_windows: Vec<usize>,
    pub volume_ma_windows: Vec<usize>,
    pub rs_window: usize,
    pub new_high_window: usize,
    pub mrs_windows: Vec<MrsWindow>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ma_windows: MA_WINDOWS.to_vec(),
            volume_ma_windows: VMA_WINDOWS.to_vec(),
            rs_window: MANSFIELD_RS_SMA_WINDOW,
            new_high_window: NEW_HIGH_WINDOW_TRADING_DAYS,
            mrs_windows: vec![
                MrsWindow::new("MRS_20", 20),
                MrsWindow::new("MRS_60", 60),
                MrsWindow::new("MRS_120", 120),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyWindows { field: &'static str },

    #[error("{field} contains a zero-length window")]
    ZeroWindow { field: &'static str },

    #[error("{field} contains duplicate window {window}")]
    DuplicateWindow { field: &'static str, window: usize },

    #[error("duplicate multi-timeframe column name {0}")]
    DuplicateName(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_windows("ma_windows", &self.ma_windows, false)?;
        check_windows("volume_ma_windows", &self.volume_ma_windows, true)?;
        if self.rs_window == 0 {
            return Err(ConfigError::ZeroWindow { field: "rs_window" });
        }
        if self.new_high_window == 0 {
            return Err(ConfigError::ZeroWindow {
                field: "new_high_window",
            });
        }
        let mrs: Vec<usize> = self.mrs_windows.iter().map(|m| m.window).collect();
        check_windows("mrs_windows", &mrs, true)?;
        let mut names = HashSet::new();
        for m in &self.mrs_windows {
            if m.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "mrs_windows",
                    reason: "column name is blank".into(),
                });
            }
            if !names.insert(m.name.as_str()) {
                return Err(ConfigError::DuplicateName(m.name.clone()));
            }
        }
        Ok(())
    }

    pub fn ma_column(window: usize) -> String {
        format!("SMA_{window}")
    }

    pub fn vma_column(window: usize) -> String {
        format!("VMA_{window}")
    }

    /// Feature column names in output order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ma_windows.iter().map(|&w| Self::ma_column(w)).collect();
        names.extend(self.volume_ma_windows.iter().map(|&w| Self::vma_column(w)));
        names.push("MansfieldRS".into());
        names.push("IsNewHigh1Y".into());
        names.extend(self.mrs_windows.iter().map(|m| m.name.clone()));
        names
    }
}

fn check_windows(
    field: &'static str,
    windows: &[usize],
    allow_empty: bool,
) -> Result<(), ConfigError> {
    if windows.is_empty() && !allow_empty {
        return Err(ConfigError::EmptyWindows { field });
    }
    let mut seen = HashSet::new();
    for &w in windows {
        if w == 0 {
            return Err(ConfigError::ZeroWindow { field });
        }
        if !seen.insert(w) {
            return Err(ConfigError::DuplicateWindow { field, window: w });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = FeatureConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ma_windows, vec![5, 10, 20, 60, 120, 200]);
        assert_eq!(cfg.rs_window, 200);
        assert_eq!(cfg.new_high_window, 252);
    }

    #[test]
    fn zero_window_is_rejected() {
        let cfg = FeatureConfig {
            ma_windows: vec![5, 0],
            ..FeatureConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroWindow {
                field: "ma_windows"
            })
        );
    }

    #[test]
    fn duplicate_window_is_rejected() {
        let cfg = FeatureConfig {
            volume_ma_windows: vec![20, 20],
            ..FeatureConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateWindow { window: 20, .. })
        ));
    }

    #[test]
    fn empty_ma_windows_are_rejected() {
        let cfg = FeatureConfig {
            ma_windows: vec![],
            ..FeatureConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::EmptyWindows { .. })
        ));
    }

    #[test]
    fn duplicate_mrs_names_are_rejected() {
        let cfg = FeatureConfig {
            mrs_windows: vec![MrsWindow::new("MRS", 20), MrsWindow::new("MRS", 60)],
            ..FeatureConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::DuplicateName("MRS".into())));
    }

    #[test]
    fn feature_names_follow_window_order() {
        let names = FeatureConfig::default().feature_names();
        assert_eq!(names[0], "SMA_5");
        assert_eq!(names[5], "SMA_200");
        assert_eq!(names[6], "VMA_5");
        assert!(names.contains(&"MansfieldRS".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("MRS_120"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: FeatureConfig = serde_json::from_str(r#"{"rs_window": 150}"#).unwrap();
        assert_eq!(cfg.rs_window, 150);
        assert_eq!(cfg.new_high_window, 252);
    }
}
