//! Instrument master snapshots stored as JSON record arrays.
//!
//! Expected shape: `[{"Code": "005930", "Name": ..., "Market": ...,
//! "IndustryLarge": ..., "IndustryMid": ..., "IndustrySmall": ...,
//! "SharesOutstanding": ...}, ...]`. Missing keys are tolerated; codes may be
//! numbers or strings.

use super::provider::ProviderError;
use crate::domain::{normalize_code, normalize_industry, InstrumentMaster};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct MasterRow {
    #[serde(rename = "Code", default)]
    code: Value,
    #[serde(rename = "Name", default)]
    name: Value,
    #[serde(rename = "Market", default)]
    market: Value,
    #[serde(rename = "IndustryLarge", default)]
    industry_large: Value,
    #[serde(rename = "IndustryMid", default)]
    industry_mid: Value,
    #[serde(rename = "IndustrySmall", default)]
    industry_small: Value,
    #[serde(rename = "SharesOutstanding", default)]
    shares_outstanding: Value,
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// Parse a master snapshot.
///
/// Rows without a code are dropped, `(code, market)` duplicates keep the
/// first occurrence, and the result is ordered by market then code.
pub fn parse_master_json(json: &str) -> Result<Vec<InstrumentMaster>, ProviderError> {
    let rows: Vec<MasterRow> = serde_json::from_str(json)
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("instrument master: {e}")))?;
    if rows.is_empty() {
        return Err(ProviderError::MasterUnavailable("instrument master is empty".into()));
    }

    let mut seen = HashSet::new();
    let mut out: Vec<InstrumentMaster> = Vec::with_capacity(rows.len());
    for row in rows {
        let code = text(&row.code);
        if code.is_empty() {
            continue;
        }
        let code = normalize_code(&code);
        let market = text(&row.market);
        if !seen.insert((code.clone(), market.clone())) {
            continue;
        }
        out.push(InstrumentMaster {
            code,
            name: text(&row.name),
            market,
            industry_large: normalize_industry(&text(&row.industry_large)).to_string(),
            industry_mid: normalize_industry(&text(&row.industry_mid)).to_string(),
            industry_small: normalize_industry(&text(&row.industry_small)).to_string(),
            shares_outstanding: whole_number(&row.shares_outstanding),
        });
    }

    if out.is_empty() {
        return Err(ProviderError::MasterUnavailable(
            "instrument master has no valid rows".into(),
        ));
    }
    out.sort_by(|a, b| a.market.cmp(&b.market).then_with(|| a.code.cmp(&b.code)));
    Ok(out)
}

/// Read and parse a master snapshot from disk.
pub fn load_master_json(path: &Path) -> Result<Vec<InstrumentMaster>, ProviderError> {
    let json = std::fs::read_to_string(path)?;
    parse_master_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_padded_and_rows_ordered() {
        let json = r#"[
            {"Code": 660, "Name": "SK Hynix", "Market": "KOSPI", "IndustryLarge": "IT"},
            {"Code": "35720", "Name": "Kakao", "Market": "KOSDAQ", "SharesOutstanding": "445,000,000"},
            {"Code": "005930", "Name": "Samsung", "Market": "KOSPI", "IndustryLarge": "IT", "IndustryMid": "nan"}
        ]"#;
        let master = parse_master_json(json).unwrap();
        let codes: Vec<&str> = master.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["035720", "000660", "005930"]);
        assert_eq!(master[0].shares_outstanding, Some(445_000_000));
        assert_eq!(master[2].industry_mid, "");
    }

    #[test]
    fn duplicate_code_and_market_keeps_first() {
        let json = r#"[
            {"Code": "000001", "Name": "first", "Market": "KOSPI"},
            {"Code": "1", "Name": "second", "Market": "KOSPI"},
            {"Code": "000001", "Name": "fund", "Market": "ETF"}
        ]"#;
        let master = parse_master_json(json).unwrap();
        assert_eq!(master.len(), 2);
        let kospi = master.iter().find(|m| m.market == "KOSPI").unwrap();
        assert_eq!(kospi.name, "first");
    }

    #[test]
    fn empty_or_codeless_master_is_unavailable() {
        assert!(matches!(
            parse_master_json("[]"),
            Err(ProviderError::MasterUnavailable(_))
        ));
        assert!(matches!(
            parse_master_json(r#"[{"Name": "no code"}]"#),
            Err(ProviderError::MasterUnavailable(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        assert!(matches!(
            parse_master_json("{not json"),
            Err(ProviderError::ResponseFormatChanged(_))
        ));
    }
}
