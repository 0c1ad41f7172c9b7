//! Core data model types for an import.
//!
//! An upload is parsed into a [`RawTable`] of untrusted [`RawValue`]s, then turned into
//! [`CanonicalRecord`]s whose [`Value`]s match the [`FieldType`] declared for each canonical field
//! in the [`crate::catalog::Catalog`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Logical type of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Trimmed UTF-8 text.
    Text,
    /// 64-bit floating point number.
    Decimal,
    /// Date/time without offset (UTC by convention).
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Decimal => "decimal",
            Self::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// A raw cell as read from the upload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// No cell at this position (short row).
    Missing,
    /// Cell text, untrimmed.
    Text(String),
    /// Already-numeric cell. CSV never produces these; programmatic callers may.
    Number(f64),
}

impl RawValue {
    /// Text view of the cell, if it has one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

/// One data row of a [`RawTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based data row number (the first row after the header is row 1).
    pub row: usize,
    /// Cells in header order. May be shorter or longer than the header.
    pub cells: Vec<RawValue>,
}

impl RawRow {
    /// Returns the cell at `index`, or [`RawValue::Missing`] past the end of the row.
    pub fn cell(&self, index: usize) -> &RawValue {
        self.cells.get(index).unwrap_or(&RawValue::Missing)
    }
}

/// Rows of raw cells keyed by the original header strings.
///
/// Header order and casing come from the caller and are not trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Header cells, trimmed, in file order.
    pub headers: Vec<String>,
    /// Data rows in file order.
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Create a table from headers and rows of cells; rows are numbered from 1.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, cells)| RawRow { row: i + 1, cells })
            .collect();
        Self { headers, rows }
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A typed value of a canonical field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Text.
    Text(String),
    /// Decimal number.
    Decimal(f64),
    /// Timestamp.
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    /// Upload filename as supplied by the caller.
    pub filename: String,
    /// When the import started (shared by every record of one import).
    pub uploaded_at: NaiveDateTime,
    /// 1-based data row number in the upload.
    pub row: usize,
}

impl Provenance {
    /// Human-readable origin, stored alongside the record.
    pub fn description(&self) -> String {
        format!("Imported from {} - row {}", self.filename, self.row)
    }
}

/// One storage-ready record: typed canonical fields plus provenance.
///
/// Built once by the record builder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, Value>,
    provenance: Provenance,
}

impl CanonicalRecord {
    pub fn new(fields: BTreeMap<String, Value>, provenance: Provenance) -> Self {
        Self { fields, provenance }
    }

    /// Value of a canonical field; [`Value::Null`] for fields the record does not carry.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_table_numbers_rows_from_one() {
        let t = RawTable::new(
            vec!["a".to_string()],
            vec![vec![RawValue::from("x")], vec![RawValue::from("y")]],
        );
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.rows[0].row, 1);
        assert_eq!(t.rows[1].row, 2);
    }

    #[test]
    fn short_rows_read_as_missing() {
        let row = RawRow {
            row: 1,
            cells: vec![RawValue::from("only")],
        };
        assert_eq!(row.cell(0), &RawValue::Text("only".to_string()));
        assert_eq!(row.cell(3), &RawValue::Missing);
    }

    #[test]
    fn record_get_defaults_to_null() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 5)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        let rec = CanonicalRecord::new(
            BTreeMap::from([("client_name".to_string(), Value::Text("Acme".to_string()))]),
            Provenance {
                filename: "sales.csv".to_string(),
                uploaded_at: ts,
                row: 3,
            },
        );
        assert_eq!(rec.get("client_name").as_text(), Some("Acme"));
        assert!(rec.get("value").is_null());
        assert_eq!(rec.provenance().description(), "Imported from sales.csv - row 3");
    }
}
