//! Dry-run analysis of an upload: how its headers line up with the catalog, plus a sample.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::ImportResult;
use crate::types::RawValue;

use super::coerce::is_missing_token;
use super::csv::{Upload, parse_upload};
use super::pipeline::ImportOptions;
use super::resolve::resolve_columns;

/// Sample rows shown when the caller does not ask for a number.
pub const DEFAULT_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchingAnalysis {
    /// Canonical field -> upload header.
    pub matched_fields: BTreeMap<String, String>,
    /// Catalog fields no header matched.
    pub missing_fields: Vec<String>,
    /// Required fields among `missing_fields`.
    pub missing_required: Vec<String>,
    /// Upload headers no field uses.
    pub extra_columns: Vec<String>,
    /// matched / catalog fields x 100, two decimals.
    pub match_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewReport {
    pub filename: String,
    pub columns_found: Vec<String>,
    pub columns_count: usize,
    pub matching_analysis: MatchingAnalysis,
    /// First rows as header -> cell (`None` for missing cells).
    pub sample_data: Vec<BTreeMap<String, Option<String>>>,
    pub total_rows: usize,
    /// No required field is missing.
    pub ready_to_upload: bool,
    pub message: String,
}

/// Parse `upload` and report how it would be imported. Nothing is written anywhere.
pub fn preview(
    upload: &Upload,
    catalog: &Catalog,
    options: &ImportOptions,
    sample_rows: usize,
) -> ImportResult<PreviewReport> {
    let table = parse_upload(upload, options.format)?;
    let mapping = resolve_columns(&table.headers, catalog, options.match_policy);

    let matched_fields: BTreeMap<String, String> = mapping.matched().into_iter().collect();
    let missing_required = mapping.missing_required(&options.required_fields(catalog));
    let total_fields = catalog.fields().len();
    let match_percentage = round2(matched_fields.len() as f64 / total_fields as f64 * 100.0);

    let sample_data: Vec<BTreeMap<String, Option<String>>> = table
        .rows
        .iter()
        .take(sample_rows)
        .map(|row| {
            table
                .headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), sample_cell(row.cell(i))))
                .collect()
        })
        .collect();

    let message = format!(
        "{}: {}/{} fields matched",
        upload.filename,
        matched_fields.len(),
        total_fields
    );
    tracing::debug!(filename = %upload.filename, match_percentage, "preview built");

    Ok(PreviewReport {
        filename: upload.filename.clone(),
        columns_count: table.headers.len(),
        matching_analysis: MatchingAnalysis {
            missing_fields: mapping.unmatched_fields(),
            extra_columns: mapping.extra_headers(),
            matched_fields,
            missing_required: missing_required.clone(),
            match_percentage,
        },
        sample_data,
        total_rows: table.row_count(),
        ready_to_upload: missing_required.is_empty(),
        message,
        columns_found: table.headers,
    })
}

fn sample_cell(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Missing => None,
        RawValue::Number(v) => Some(v.to_string()),
        RawValue::Text(s) if is_missing_token(s) => None,
        RawValue::Text(s) => Some(s.trim().to_owned()),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldSpec;
    use crate::error::ImportError;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            FieldSpec::text("client_name", &["cliente"]).identity(),
            FieldSpec::decimal("value", &["venta"]),
            FieldSpec::timestamp("date", &["fecha"]),
        ])
        .unwrap()
    }

    #[test]
    fn analyses_headers_and_samples_rows() {
        let up = Upload::new("s.csv", "Cliente,Venta,Notas\nAcme,10,n/a\nGlobex,,x\nInitech,3,y\n");
        let p = preview(&up, &catalog(), &ImportOptions::default(), 2).unwrap();

        assert_eq!(p.columns_found, vec!["Cliente", "Venta", "Notas"]);
        assert_eq!(p.total_rows, 3);
        assert_eq!(p.sample_data.len(), 2);
        assert_eq!(p.sample_data[0]["Notas"], None);
        assert_eq!(p.sample_data[1]["Cliente"].as_deref(), Some("Globex"));
        assert_eq!(p.sample_data[1]["Venta"], None);

        let m = &p.matching_analysis;
        assert_eq!(m.matched_fields["client_name"], "Cliente");
        assert_eq!(m.missing_fields, vec!["date"]);
        assert_eq!(m.extra_columns, vec!["Notas"]);
        assert_eq!(m.match_percentage, 66.67);
        assert!(p.ready_to_upload);
        assert_eq!(p.message, "s.csv: 2/3 fields matched");
    }

    #[test]
    fn not_ready_without_identity() {
        let up = Upload::new("s.csv", "Venta\n10\n");
        let p = preview(&up, &catalog(), &ImportOptions::default(), DEFAULT_SAMPLE_ROWS).unwrap();
        assert!(!p.ready_to_upload);
        assert_eq!(p.matching_analysis.missing_required, vec!["client_name"]);
    }

    #[test]
    fn unreadable_upload_is_an_error() {
        let err = preview(&Upload::new("s.csv", ""), &catalog(), &ImportOptions::default(), 5).unwrap_err();
        assert!(matches!(err, ImportError::EmptyTable { .. }));
    }
}
