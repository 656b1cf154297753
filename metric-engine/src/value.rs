//! FILENAME: metric-engine/src/value.rs
//! PURPOSE: Defines the raw data model the engine computes over.
//! CONTEXT: Rows arrive from an upload/parsing collaborator as records
//! mapping column name to `string | number | boolean | null`. This file
//! holds that cell type and the two coercions every other module relies on:
//! the numeric view (for aggregation) and the string view (for filters).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A single cell of a data row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
}

/// One record: column name to cell.
pub type Row = FxHashMap<String, CellValue>;

impl CellValue {
    /// Numeric view used by aggregation.
    /// Numbers and fully numeric text qualify; null, booleans, blank or
    /// non-numeric text, NaN and infinities do not.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Null | CellValue::Boolean(_) => return None,
        };
        n.is_finite().then_some(n)
    }

    /// String form used by filters and distinct counts.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Number(n) => {
                // Format without unnecessary decimal places
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Null, Into::into)
    }
}

/// Builds a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<CellValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Column names present in any row, sorted.
pub fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = rows
        .iter()
        .flat_map(|r| r.keys().cloned())
        .collect::<rustc_hash::FxHashSet<String>>()
        .into_iter()
        .collect();
    names.sort();
    names
}
