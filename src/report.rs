//! Per-import report and the response shape handed back to callers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ImportError;
use crate::ingestion::record::RowError;
use crate::ingestion::resolve::{ColumnMapping, Resolution};

/// Number of row errors a response lists when the caller does not say otherwise.
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 10;

/// Terminal state of one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    /// Every accepted record was saved.
    Completed,
    /// The target's lock file could not be taken; nothing was read or written.
    LockFailed,
    /// The upload could not be read as a table.
    ParseFailed,
    /// The table was read but cannot be imported (missing required columns, no valid rows).
    Rejected,
    /// Replace mode could not purge existing records; nothing was written.
    DeleteFailed,
    /// A batch failed to commit; earlier batches may be persisted.
    PersistFailed,
}

/// Everything known about one import once it has finished.
#[derive(Debug)]
pub struct IngestionReport {
    pub filename: String,
    pub outcome: ImportOutcome,
    /// Data rows read from the upload.
    pub total_rows: usize,
    /// Rows turned into records.
    pub processed_rows: usize,
    /// Records committed to the store.
    pub saved_rows: usize,
    /// Records purged in replace mode.
    pub deleted_rows: Option<usize>,
    pub batches_committed: usize,
    pub batches_total: usize,
    /// Rejected rows, in row order.
    pub errors: Vec<RowError>,
    /// Upload headers as read.
    pub columns_found: Vec<String>,
    pub mapping: Option<ColumnMapping>,
    /// The error that ended the import early.
    pub fatal: Option<ImportError>,
}

impl IngestionReport {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            outcome: ImportOutcome::Completed,
            total_rows: 0,
            processed_rows: 0,
            saved_rows: 0,
            deleted_rows: None,
            batches_committed: 0,
            batches_total: 0,
            errors: Vec::new(),
            columns_found: Vec::new(),
            mapping: None,
            fatal: None,
        }
    }

    /// Record a fatal error and the stage it ended the import in.
    pub fn fail(&mut self, outcome: ImportOutcome, error: ImportError) {
        self.outcome = outcome;
        self.fatal = Some(error);
    }

    pub fn success(&self) -> bool {
        self.outcome == ImportOutcome::Completed
    }

    pub fn errors_count(&self) -> usize {
        self.errors.len()
    }

    /// Catalog fields that no header matched.
    pub fn missing_fields(&self) -> Vec<String> {
        self.mapping
            .as_ref()
            .map(ColumnMapping::unmatched_fields)
            .unwrap_or_default()
    }

    /// One-line summary for the caller.
    pub fn message(&self) -> String {
        let fatal = self.fatal.as_ref().map(ToString::to_string).unwrap_or_default();
        match self.outcome {
            ImportOutcome::Completed if self.errors.is_empty() => format!(
                "File processed successfully: {} of {} rows saved",
                self.saved_rows, self.total_rows
            ),
            ImportOutcome::Completed => format!(
                "File processed with warnings: {} of {} rows saved, {} rows skipped",
                self.saved_rows,
                self.total_rows,
                self.errors.len()
            ),
            ImportOutcome::LockFailed => format!("Could not lock the target table, nothing was imported: {fatal}"),
            ImportOutcome::ParseFailed => format!("Could not read file: {fatal}"),
            ImportOutcome::Rejected => format!("File rejected: {fatal}"),
            ImportOutcome::DeleteFailed => {
                format!("Could not delete existing records, nothing was imported: {fatal}")
            }
            ImportOutcome::PersistFailed => format!(
                "Import stopped after saving {} of {} rows: {fatal}",
                self.saved_rows, self.processed_rows
            ),
        }
    }

    /// The first `max` row errors, followed by `"... and K more errors"` when truncated.
    pub fn error_messages(&self, max: usize) -> Vec<String> {
        let mut out: Vec<String> = self.errors.iter().take(max).map(ToString::to_string).collect();
        let rest = self.errors.len().saturating_sub(max);
        if rest > 0 {
            out.push(format!("... and {rest} more errors"));
        }
        out
    }

    /// Serializable response; `errors` is omitted when no row was rejected.
    pub fn to_response(&self, max_errors: usize) -> ImportResponse {
        let column_mapping: BTreeMap<String, Option<String>> = self
            .mapping
            .as_ref()
            .map(|m| {
                m.fields()
                    .iter()
                    .map(|f| {
                        let header = match &f.resolution {
                            Resolution::Resolved { header, .. } => Some(header.clone()),
                            Resolution::Absent => None,
                        };
                        (f.field.clone(), header)
                    })
                    .collect()
            })
            .unwrap_or_default();

        ImportResponse {
            success: self.success(),
            message: self.message(),
            details: ImportDetails {
                filename: self.filename.clone(),
                outcome: self.outcome,
                total_rows: self.total_rows,
                processed_rows: self.processed_rows,
                saved_rows: self.saved_rows,
                errors_count: self.errors.len(),
                columns_found: self.columns_found.clone(),
                columns_count: self.columns_found.len(),
                column_mapping,
                missing_fields: self.missing_fields(),
                deleted_rows: self.deleted_rows,
            },
            errors: (!self.errors.is_empty()).then(|| self.error_messages(max_errors)),
        }
    }
}

/// What the caller of an import receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    pub details: ImportDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDetails {
    pub filename: String,
    pub outcome: ImportOutcome,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub saved_rows: usize,
    pub errors_count: usize,
    pub columns_found: Vec<String>,
    pub columns_count: usize,
    /// Canonical field -> upload header (`null` when unmatched).
    pub column_mapping: BTreeMap<String, Option<String>>,
    pub missing_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_rows: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, FieldSpec};
    use crate::error::StorageError;
    use crate::ingestion::record::RowErrorKind;
    use crate::ingestion::resolve::{MatchPolicy, resolve_columns};

    fn row_errors(n: usize) -> Vec<RowError> {
        (1..=n)
            .map(|row| RowError {
                row,
                kind: RowErrorKind::IdentityMissing {
                    field: "client_name".to_string(),
                },
            })
            .collect()
    }

    #[test]
    fn error_list_is_truncated_with_remainder() {
        let mut r = IngestionReport::new("f.csv");
        r.errors = row_errors(13);
        let msgs = r.error_messages(10);
        assert_eq!(msgs.len(), 11);
        assert_eq!(msgs[0], "Row 1: missing value for required field 'client_name'");
        assert_eq!(msgs[10], "... and 3 more errors");

        assert_eq!(r.error_messages(20).len(), 13);
    }

    #[test]
    fn response_shape() {
        let catalog = Catalog::new(vec![
            FieldSpec::text("client_name", &["cliente"]).identity(),
            FieldSpec::decimal("value", &["venta"]),
        ])
        .unwrap();
        let headers = vec!["Cliente".to_string(), "Otro".to_string()];

        let mut r = IngestionReport::new("f.csv");
        r.total_rows = 3;
        r.processed_rows = 2;
        r.saved_rows = 2;
        r.errors = row_errors(1);
        r.columns_found = headers.clone();
        r.mapping = Some(resolve_columns(&headers, &catalog, MatchPolicy::FirstMatch));

        let json = serde_json::to_value(r.to_response(10)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["details"]["processed_rows"], 2);
        assert_eq!(json["details"]["columns_count"], 2);
        assert_eq!(json["details"]["column_mapping"]["client_name"], "Cliente");
        assert!(json["details"]["column_mapping"]["value"].is_null());
        assert_eq!(json["details"]["missing_fields"][0], "value");
        assert_eq!(json["errors"].as_array().map(Vec::len), Some(1));
        assert!(json["details"].get("deleted_rows").is_none());
    }

    #[test]
    fn clean_import_has_no_errors_key() {
        let r = IngestionReport::new("f.csv");
        let json = serde_json::to_value(r.to_response(10)).unwrap();
        assert!(json.get("errors").is_none());
        assert_eq!(json["details"]["outcome"], "completed");
    }

    #[test]
    fn failure_message_carries_cause() {
        let mut r = IngestionReport::new("f.csv");
        r.processed_rows = 10;
        r.saved_rows = 4;
        r.fail(
            ImportOutcome::PersistFailed,
            ImportError::Persistence {
                batch: 3,
                batches_total: 5,
                saved_rows: 4,
                source: StorageError::Rejected {
                    operation: "commit".to_string(),
                    message: "disk full".to_string(),
                },
            },
        );
        assert!(!r.success());
        let msg = r.message();
        assert!(msg.starts_with("Import stopped after saving 4 of 10 rows"), "{msg}");
        assert!(msg.contains("disk full"), "{msg}");
    }
}
