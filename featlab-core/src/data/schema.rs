use polars::prelude::*;

pub const DATE: &str = "Date";
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";
pub const TRADING_VALUE: &str = "TradingValue";
pub const CHANGE: &str = "Change";
pub const TICKER: &str = "Ticker";

/// Columns every raw series must provide after renaming.
pub const REQUIRED_COLUMNS: [&str; 6] = [DATE, OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Columns filled with nulls when a provider omits them.
pub const OPTIONAL_COLUMNS: [&str; 2] = [TRADING_VALUE, CHANGE];

/// Canonical daily series schema.
pub struct SeriesSchema;

impl SeriesSchema {
    /// Canonical name for a provider column header, if it is recognised.
    ///
    /// Accepts the canonical headers, their lowercase/snake forms, and the
    /// Korean exchange headers.
    pub fn canonical_name(header: &str) -> Option<&'static str> {
        let name = match header.trim() {
            "시가" => OPEN,
            "고가" => HIGH,
            "저가" => LOW,
            "종가" => CLOSE,
            "거래량" => VOLUME,
            "거래대금" => TRADING_VALUE,
            "등락률" => CHANGE,
            "날짜" => DATE,
            other => match other.to_ascii_lowercase().replace('_', "").as_str() {
                "date" | "datetime" | "timestamp" => DATE,
                "open" => OPEN,
                "high" => HIGH,
                "low" => LOW,
                "close" => CLOSE,
                "volume" => VOLUME,
                "tradingvalue" | "value" | "amount" => TRADING_VALUE,
                "change" | "changepct" => CHANGE,
                _ => return None,
            },
        };
        Some(name)
    }

    /// Rename recognised columns to their canonical names.
    ///
    /// Unrecognised columns are kept as-is. When two headers map to the same
    /// canonical name the first one wins and the later one is left untouched.
    pub fn rename_to_canonical(raw: &DataFrame) -> Result<DataFrame, SchemaError> {
        let mut df = raw.clone();
        let mut taken: Vec<&'static str> = Vec::new();
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        for header in headers {
            let Some(canonical) = Self::canonical_name(&header) else {
                continue;
            };
            if taken.contains(&canonical) {
                continue;
            }
            taken.push(canonical);
            if header != canonical {
                df.rename(&header, canonical.into())
                    .map_err(|e| SchemaError::Frame(e.to_string()))?;
            }
        }
        Ok(df)
    }

    /// Verify the required columns exist after renaming.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| df.column(c).is_err())
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::MissingColumns(missing))
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("raw series for {0} is empty")]
    EmptyInput(String),

    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("column {column} cannot be converted to {expected}: {reason}")]
    NotCoercible {
        column: String,
        expected: &'static str,
        reason: String,
    },

    #[error("unparseable date {value:?} at row {row}")]
    InvalidDate { row: usize, value: String },

    #[error("no valid rows after standardization for {0}")]
    NoValidRows(String),

    #[error("frame error: {0}")]
    Frame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_headers_map_to_canonical() {
        assert_eq!(SeriesSchema::canonical_name("종가"), Some(CLOSE));
        assert_eq!(SeriesSchema::canonical_name("거래대금"), Some(TRADING_VALUE));
        assert_eq!(SeriesSchema::canonical_name("등락률"), Some(CHANGE));
    }

    #[test]
    fn lowercase_headers_map_to_canonical() {
        assert_eq!(SeriesSchema::canonical_name("close"), Some(CLOSE));
        assert_eq!(SeriesSchema::canonical_name("trading_value"), Some(TRADING_VALUE));
        assert_eq!(SeriesSchema::canonical_name("Adj Close"), None);
    }

    #[test]
    fn rename_and_validate_accepts_korean_frame() {
        let df = df!(
            "날짜" => &["2024-01-02"],
            "시가" => &[100i64],
            "고가" => &[110i64],
            "저가" => &[95i64],
            "종가" => &[105i64],
            "거래량" => &[1000i64],
        )
        .unwrap();
        let renamed = SeriesSchema::rename_to_canonical(&df).unwrap();
        assert!(SeriesSchema::validate(&renamed).is_ok());
        assert!(renamed.column(CLOSE).is_ok());
    }

    #[test]
    fn validate_rejects_missing_column() {
        let df = df!(
            "Date" => &["2024-01-02"],
            "Close" => &[105i64],
        )
        .unwrap();
        let result = SeriesSchema::validate(&df);
        assert!(matches!(result, Err(SchemaError::MissingColumns(ref m)) if m.len() == 4));
    }
}
