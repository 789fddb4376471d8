//! Record / column-header model (spec §3).
//!
//! A `Record` is a mapping from canonical column header to stringified cell
//! value, always carrying a `Timestamp` key. Records are produced by step
//! execution and flow, unretained, through the file-request channel
//! (`seqlab-storage::FileRequest::WriteLine`).

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cell value absent from a given row.
pub const MISSING_CELL: &str = "-";

/// Canonical column header: `"<instrument>--<parameter> (<unit>)"` for a
/// continuous reading, `"<instrument>--<parameter>"` otherwise (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnHeader(String);

impl ColumnHeader {
    /// Build a header for a continuous (unit-bearing) reading or component.
    pub fn continuous(instrument: &str, parameter: &str, unit: &str) -> Self {
        if unit.is_empty() {
            Self::bare(instrument, parameter)
        } else {
            ColumnHeader(format!("{instrument}--{parameter} ({unit})"))
        }
    }

    /// Build a header for a discrete or action reading (no unit suffix).
    pub fn bare(instrument: &str, parameter: &str) -> Self {
        ColumnHeader(format!("{instrument}--{parameter}"))
    }

    /// The literal `Timestamp` header, always first.
    pub fn timestamp() -> Self {
        ColumnHeader("Timestamp".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ColumnHeader {
    fn from(s: &str) -> Self {
        ColumnHeader(s.to_string())
    }
}

/// One emitted row. Preserves insertion order for iteration (`cells_in_order`)
/// while still supporting lookup by header, matching the spec's "insertion
/// order of the step graph's emitted keys" rule for `getVarsList` (§3, §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    order: Vec<ColumnHeader>,
    cells: BTreeMap<ColumnHeader, String>,
}

impl Record {
    /// A record stamped `now` in local time, microsecond precision (§3).
    pub fn new() -> Self {
        let mut r = Record::default();
        r.insert(ColumnHeader::timestamp(), format_timestamp(Local::now()));
        r
    }

    /// Insert (or overwrite) a cell, tracking first-seen insertion order.
    pub fn insert(&mut self, header: ColumnHeader, value: impl Into<String>) {
        if !self.cells.contains_key(&header) {
            self.order.push(header.clone());
        }
        self.cells.insert(header, value.into());
    }

    pub fn get(&self, header: &ColumnHeader) -> Option<&str> {
        self.cells.get(header).map(|s| s.as_str())
    }

    /// Headers in insertion order (`Timestamp` first, since it's inserted by
    /// `new()` before anything else).
    pub fn headers(&self) -> &[ColumnHeader] {
        &self.order
    }

    /// Render this record's cells against a fixed column plan (§6.2), using
    /// `MISSING_CELL` for any header the plan names but this row lacks.
    pub fn row(&self, plan: &[ColumnHeader]) -> Vec<String> {
        plan.iter()
            .map(|h| {
                self.cells
                    .get(h)
                    .cloned()
                    .unwrap_or_else(|| MISSING_CELL.to_string())
            })
            .collect()
    }
}

/// `YYYY-MM-DD HH:MM:SS.ffffff` in local timezone, microsecond precision.
pub fn format_timestamp(t: DateTime<Local>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_first_header() {
        let mut r = Record::new();
        r.insert(ColumnHeader::continuous("dmm", "Voltage", "V"), "1.0");
        assert_eq!(r.headers()[0], ColumnHeader::timestamp());
        assert_eq!(r.headers()[1].as_str(), "dmm--Voltage (V)");
    }

    #[test]
    fn row_fills_missing_with_dash() {
        let mut r = Record::new();
        let v = ColumnHeader::continuous("dmm", "Voltage", "V");
        r.insert(v.clone(), "1.0");
        let other = ColumnHeader::continuous("src", "Current", "A");
        let plan = vec![ColumnHeader::timestamp(), v, other];
        let row = r.row(&plan);
        assert_eq!(row[1], "1.0");
        assert_eq!(row[2], MISSING_CELL);
    }

    #[test]
    fn bare_header_has_no_unit_suffix() {
        let h = ColumnHeader::bare("src", "Output");
        assert_eq!(h.as_str(), "src--Output");
    }
}
