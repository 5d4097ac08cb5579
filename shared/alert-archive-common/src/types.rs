//! Shared types for alert archive scans and query results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ArchiveError;
use crate::Result;

/// Column family holding store bookkeeping (the row key's own fields)
pub const INTERNAL_FAMILY: &str = "key";

/// Which columns a scan should return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFilter {
    /// Every column of the row
    #[default]
    All,
    /// Only the listed `family:qualifier` columns
    Columns(Vec<String>),
}

impl ColumnFilter {
    /// Build a filter from an optional comma-separated column list
    pub fn from_list(columns: Option<&str>) -> Self {
        match columns {
            Some(list) if !list.trim().is_empty() => ColumnFilter::Columns(
                list.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            ),
            _ => ColumnFilter::All,
        }
    }

    /// Whether the caller restricted columns (truncated query)
    pub fn is_truncated(&self) -> bool {
        matches!(self, ColumnFilter::Columns(_))
    }

    /// Whether a column passes the filter
    pub fn accepts(&self, column: &str) -> bool {
        match self {
            ColumnFilter::All => true,
            ColumnFilter::Columns(columns) => columns.iter().any(|c| c == column),
        }
    }

    /// Add columns needed downstream, keeping `All` untouched
    pub fn with_required(mut self, required: &[&str]) -> Self {
        if let ColumnFilter::Columns(columns) = &mut self {
            for column in required {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        self
    }
}

/// One key-prefix or key-range scan against a single table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub table: String,
    pub start_key: String,
    /// Exclusive upper bound; only set for range scans
    pub stop_key: Option<String>,
    pub column_filter: ColumnFilter,
    /// Bounds this request only, not the merged query
    pub limit: Option<usize>,
    /// Most-recent-first (descending key order)
    pub reversed: bool,
    pub range_scan: bool,
}

impl ScanRequest {
    /// Scan every key starting with `prefix`
    pub fn prefix(table: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            start_key: prefix.into(),
            stop_key: None,
            column_filter: ColumnFilter::All,
            limit: None,
            reversed: false,
            range_scan: false,
        }
    }

    /// Scan keys in `[start, stop)`
    pub fn range(
        table: impl Into<String>,
        start: impl Into<String>,
        stop: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            start_key: start.into(),
            stop_key: Some(stop.into()),
            column_filter: ColumnFilter::All,
            limit: None,
            reversed: false,
            range_scan: true,
        }
    }

    /// Set the column filter
    pub fn with_columns(mut self, filter: ColumnFilter) -> Self {
        self.column_filter = filter;
        self
    }

    /// Set the per-request row limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return rows most-recent-first
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    /// Check the range invariant
    pub fn validate(&self) -> Result<()> {
        if self.range_scan {
            match &self.stop_key {
                Some(stop) if self.start_key.as_str() <= stop.as_str() => Ok(()),
                Some(stop) => Err(ArchiveError::InvalidRequest(format!(
                    "scan range start '{}' is after stop '{}'",
                    self.start_key, stop
                ))),
                None => Err(ArchiveError::InvalidRequest(
                    "range scan without a stop key".to_string(),
                )),
            }
        } else {
            Ok(())
        }
    }

    /// Whether `key` falls inside this request
    pub fn matches_key(&self, key: &str) -> bool {
        if self.range_scan {
            let below_stop = self
                .stop_key
                .as_deref()
                .map(|stop| key < stop)
                .unwrap_or(true);
            key >= self.start_key.as_str() && below_stop
        } else {
            key.starts_with(&self.start_key)
        }
    }
}

/// Untyped row as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub key: String,
    /// `family:qualifier` -> raw cell text
    pub cells: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Builder-style cell insertion
    pub fn with_cell(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }
}

/// Typed cell value after coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view of the cell (ints widen to floats)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// JSON view used by row-oriented encodings; NaN becomes null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Int(v) => serde_json::Value::from(*v),
            CellValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Bool(v) => serde_json::Value::Bool(*v),
            CellValue::Str(v) => serde_json::Value::String(v.clone()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Str(v.to_string())
    }
}
