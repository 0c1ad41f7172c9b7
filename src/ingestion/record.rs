//! Builds one [`CanonicalRecord`] per raw row.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

use crate::catalog::{Catalog, FieldDefault, FieldSpec};
use crate::types::{CanonicalRecord, Provenance, RawRow, Value};

use super::coerce::{Coerced, coerce};
use super::resolve::ColumnMapping;

/// Why a row was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowErrorKind {
    /// The identity field is unresolved, empty or a missing-value token.
    IdentityMissing { field: String },
    /// The row has more cells than the header.
    TooManyCells { cells: usize, headers: usize },
}

/// A rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based data row number.
    pub row: usize,
    pub kind: RowErrorKind,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RowErrorKind::IdentityMissing { field } => {
                write!(f, "Row {}: missing value for required field '{field}'", self.row)
            }
            RowErrorKind::TooManyCells { cells, headers } => write!(
                f,
                "Row {}: has {cells} cells but the header has {headers}",
                self.row
            ),
        }
    }
}

/// Turns raw rows into canonical records for one import.
///
/// Holds everything that is fixed for the import: catalog, column mapping, upload filename and
/// the import's "now".
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    catalog: &'a Catalog,
    mapping: &'a ColumnMapping,
    filename: &'a str,
    now: NaiveDateTime,
    header_count: usize,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        catalog: &'a Catalog,
        mapping: &'a ColumnMapping,
        filename: &'a str,
        header_count: usize,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            catalog,
            mapping,
            filename,
            now,
            header_count,
        }
    }

    /// Build the record for `row`, or say why it was rejected.
    ///
    /// Only the identity field can reject a row; every other field falls back to its default.
    pub fn build(&self, row: &RawRow) -> Result<CanonicalRecord, RowError> {
        if row.cells.len() > self.header_count {
            return Err(RowError {
                row: row.row,
                kind: RowErrorKind::TooManyCells {
                    cells: row.cells.len(),
                    headers: self.header_count,
                },
            });
        }

        let mut fields = BTreeMap::new();
        for spec in self.catalog.fields() {
            let coerced = match self.mapping.index_of(&spec.name) {
                Some(idx) => coerce(row.cell(idx), spec.field_type),
                None => Coerced::Missing,
            };

            if spec.identity && !coerced.is_value() {
                return Err(RowError {
                    row: row.row,
                    kind: RowErrorKind::IdentityMissing {
                        field: spec.name.clone(),
                    },
                });
            }

            fields.insert(spec.name.clone(), coerced.or_default(self.default_for(spec)));
        }

        Ok(CanonicalRecord::new(
            fields,
            Provenance {
                filename: self.filename.to_owned(),
                uploaded_at: self.now,
                row: row.row,
            },
        ))
    }

    /// Build every row, splitting accepted records from rejected rows.
    pub fn build_all<'r>(&self, rows: impl IntoIterator<Item = &'r RawRow>) -> (Vec<CanonicalRecord>, Vec<RowError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for row in rows {
            match self.build(row) {
                Ok(r) => records.push(r),
                Err(e) => {
                    tracing::warn!(row = e.row, "{e}");
                    errors.push(e);
                }
            }
        }
        (records, errors)
    }

    fn default_for(&self, spec: &FieldSpec) -> Value {
        match &spec.default {
            FieldDefault::Null => Value::Null,
            FieldDefault::Text(s) => Value::Text(s.clone()),
            FieldDefault::Decimal(v) => Value::Decimal(*v),
            FieldDefault::Now => Value::Timestamp(self.now),
        }
    }
}
