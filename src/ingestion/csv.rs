//! Delimited-text parsing: upload bytes -> [`RawTable`].

use std::path::Path;

use crate::error::{ImportError, ImportResult};
use crate::types::{RawTable, RawValue};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Supported tabular formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    /// Comma-separated values.
    Csv,
    /// Tab-separated values.
    Tsv,
}

impl TabularFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            _ => None,
        }
    }

    pub fn delimiter(self) -> u8 {
        match self {
            Self::Csv => b',',
            Self::Tsv => b'\t',
        }
    }
}

/// An uploaded file: caller-supplied name plus its full contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk; the upload's filename is the path's final component.
    pub fn from_path(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}

/// Infer the format from the upload's filename extension.
pub fn infer_format(filename: &str) -> ImportResult<TabularFormat> {
    Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .and_then(TabularFormat::from_extension)
        .ok_or_else(|| ImportError::UnsupportedFormat {
            filename: filename.to_owned(),
        })
}

/// Parse an upload into a [`RawTable`].
///
/// Rules:
///
/// - `format` overrides extension inference; otherwise the filename must end in a known extension.
/// - Contents must be UTF-8 (a leading BOM is ignored).
/// - The first record is the header; header cells are trimmed.
/// - Rows may be shorter or longer than the header; blank lines are skipped.
/// - No header or no data rows is an [`ImportError::EmptyTable`].
pub fn parse_upload(upload: &Upload, format: Option<TabularFormat>) -> ImportResult<RawTable> {
    let format = match format {
        Some(f) => f,
        None => infer_format(&upload.filename)?,
    };

    let bytes = upload.bytes.strip_prefix(UTF8_BOM).unwrap_or(&upload.bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| ImportError::Decode {
        filename: upload.filename.clone(),
        message: e.to_string(),
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(format.delimiter())
        .from_reader(text.as_bytes());
    let table = read_table(&mut rdr)?;

    if table.headers.iter().all(|h| h.is_empty()) || table.rows.is_empty() {
        return Err(ImportError::EmptyTable {
            filename: upload.filename.clone(),
        });
    }
    Ok(table)
}

/// Read every record from an existing CSV reader (which must be configured with headers).
pub fn read_table<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> ImportResult<RawTable> {
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_owned()).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(RawValue::from).collect());
    }
    Ok(RawTable::new(headers, rows))
}
