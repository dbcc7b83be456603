use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of an exchange instrument code.
pub const CODE_WIDTH: usize = 6;

/// Market label marking fund vehicles, which carry no operating industry.
pub const FUND_MARKET: &str = "ETF";

/// Label substituted for a blank classification at a level in use.
pub const UNKNOWN_INDUSTRY: &str = "Unknown";

/// Normalize an instrument code to its fixed width.
///
/// Numeric codes are zero-padded (feeds often drop leading zeros); anything
/// else is only trimmed.
pub fn normalize_code(code: &str) -> String {
    let code = code.trim();
    if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) {
        format!("{code:0>CODE_WIDTH$}")
    } else {
        code.to_string()
    }
}

/// Static reference data for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMaster {
    pub code: String,
    pub name: String,
    pub market: String,
    pub industry_large: String,
    pub industry_mid: String,
    pub industry_small: String,
    pub shares_outstanding: Option<i64>,
}

impl InstrumentMaster {
    pub fn is_fund(&self) -> bool {
        self.market.trim() == FUND_MARKET
    }

    /// True when any classification level carries a value.
    pub fn has_classification(&self) -> bool {
        !normalize_industry(&self.industry_large).is_empty()
            || !normalize_industry(&self.industry_mid).is_empty()
            || !normalize_industry(&self.industry_small).is_empty()
    }
}

/// Trim a classification value; feed placeholders ("nan", "None") become blank.
pub fn normalize_industry(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("nan") || trimmed.eq_ignore_ascii_case("none") {
        ""
    } else {
        trimmed
    }
}

/// Depth of the industry classification used for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndustryLevel {
    #[serde(rename = "L")]
    Large,
    #[serde(rename = "LM")]
    LargeMid,
    #[serde(rename = "LMS")]
    LargeMidSmall,
}

impl IndustryLevel {
    pub const ALL: [IndustryLevel; 3] = [
        IndustryLevel::Large,
        IndustryLevel::LargeMid,
        IndustryLevel::LargeMidSmall,
    ];

    pub fn code(self) -> &'static str {
        match self {
            IndustryLevel::Large => "L",
            IndustryLevel::LargeMid => "LM",
            IndustryLevel::LargeMidSmall => "LMS",
        }
    }

    /// Coarser levels this level refines.
    pub fn parents(self) -> &'static [IndustryLevel] {
        match self {
            IndustryLevel::Large => &[],
            IndustryLevel::LargeMid => &[IndustryLevel::Large],
            IndustryLevel::LargeMidSmall => &[IndustryLevel::Large, IndustryLevel::LargeMid],
        }
    }

    /// Output labels and grouping key for an instrument's classification.
    ///
    /// Levels in use get `Unknown` for blanks; coarser levels are empty.
    pub fn labels(self, large: &str, mid: &str, small: &str) -> IndustryLabels {
        let or_unknown = |v: &str| {
            let v = normalize_industry(v);
            if v.is_empty() {
                UNKNOWN_INDUSTRY.to_string()
            } else {
                v.to_string()
            }
        };
        let large = or_unknown(large);
        let (mid, small) = match self {
            IndustryLevel::Large => (String::new(), String::new()),
            IndustryLevel::LargeMid => (or_unknown(mid), String::new()),
            IndustryLevel::LargeMidSmall => (or_unknown(mid), or_unknown(small)),
        };
        let key = match self {
            IndustryLevel::Large => large.clone(),
            IndustryLevel::LargeMid => format!("{large}||{mid}"),
            IndustryLevel::LargeMidSmall => format!("{large}||{mid}||{small}"),
        };
        IndustryLabels {
            key,
            large,
            mid,
            small,
        }
    }
}

impl fmt::Display for IndustryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for IndustryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(IndustryLevel::Large),
            "LM" => Ok(IndustryLevel::LargeMid),
            "LMS" => Ok(IndustryLevel::LargeMidSmall),
            other => Err(format!("invalid industry level: {other}")),
        }
    }
}

/// Labels identifying one industry group at one level.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndustryLabels {
    pub key: String,
    pub large: String,
    pub mid: String,
    pub small: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_padded() {
        assert_eq!(normalize_code("5930"), "005930");
        assert_eq!(normalize_code(" 069500 "), "069500");
        assert_eq!(normalize_code("SPY"), "SPY");
    }

    #[test]
    fn placeholder_industries_are_blank() {
        assert_eq!(normalize_industry(" nan "), "");
        assert_eq!(normalize_industry("None"), "");
        assert_eq!(normalize_industry(" 금융 "), "금융");
    }

    #[test]
    fn labels_fill_unknown_only_at_levels_in_use() {
        let l = IndustryLevel::Large.labels("", "Banks", "Commercial");
        assert_eq!(l.key, "Unknown");
        assert_eq!(l.mid, "");
        assert_eq!(l.small, "");

        let lms = IndustryLevel::LargeMidSmall.labels("Finance", "", "Commercial");
        assert_eq!(lms.key, "Finance||Unknown||Commercial");
        assert_eq!(lms.mid, "Unknown");
    }

    #[test]
    fn parents_are_coarser_levels() {
        assert!(IndustryLevel::Large.parents().is_empty());
        assert_eq!(
            IndustryLevel::LargeMidSmall.parents(),
            &[IndustryLevel::Large, IndustryLevel::LargeMid]
        );
    }

    #[test]
    fn level_parses_from_code() {
        assert_eq!("lm".parse::<IndustryLevel>(), Ok(IndustryLevel::LargeMid));
        assert!("X".parse::<IndustryLevel>().is_err());
    }

    #[test]
    fn etf_market_is_fund() {
        let m = InstrumentMaster {
            code: "069500".into(),
            name: "KODEX 200".into(),
            market: "ETF".into(),
            industry_large: String::new(),
            industry_mid: String::new(),
            industry_small: String::new(),
            shares_outstanding: None,
        };
        assert!(m.is_fund());
        assert!(!m.has_classification());
    }
}
