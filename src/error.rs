use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Convenience result type for [`crate::storage::RecordStore`] operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Fatal error for one import.
///
/// Row-level problems are never reported through this type; they are collected as
/// [`crate::ingestion::record::RowError`]s in the [`crate::report::IngestionReport`] and the
/// import carries on.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration or catalog TOML could not be deserialized.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The filename does not carry a recognized tabular extension.
    #[error("unsupported file '{filename}': expected a .csv, .tsv or .tab file")]
    UnsupportedFormat { filename: String },

    /// The upload is not valid UTF-8.
    #[error("file '{filename}' is not valid UTF-8: {message}")]
    Decode { filename: String, message: String },

    /// The upload has no header row or no data rows.
    #[error("file '{filename}' is empty")]
    EmptyTable { filename: String },

    /// One or more required canonical fields did not match any header.
    #[error("missing required columns {missing:?}. headers={headers:?}")]
    MissingRequiredColumns {
        missing: Vec<String>,
        headers: Vec<String>,
    },

    /// Every data row was rejected.
    #[error("no records could be built. errors: {}", first_errors.join("; "))]
    NoValidRecords { first_errors: Vec<String> },

    /// Replace mode could not purge the existing records; nothing was written.
    #[error("failed to delete existing records: {source}")]
    Deletion {
        #[source]
        source: StorageError,
    },

    /// A batch failed to commit. Batches committed before it remain persisted unless the
    /// import ran in all-or-nothing mode.
    #[error("failed to save batch {batch}/{batches_total} ({saved_rows} rows already saved): {source}")]
    Persistence {
        batch: usize,
        batches_total: usize,
        saved_rows: usize,
        #[source]
        source: StorageError,
    },

    /// The lock file serialising imports into the target could not be taken.
    #[error("could not lock '{}': {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage error outside the delete/insert phases (opening, schema setup, counting).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid canonical field catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Invalid configuration value.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Error returned by a [`crate::storage::RecordStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store refused an operation (used by non-SQL stores).
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },
}

/// The canonical field catalog does not describe a usable table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog has no fields")]
    Empty,

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("'{0}' is not a valid column name (expected [a-z_][a-z0-9_]*)")]
    InvalidName(String),

    #[error("field '{0}' has no aliases")]
    NoAliases(String),

    #[error("expected exactly one identity field, found {0}")]
    IdentityCount(usize),

    #[error("identity field '{0}' must be text with no default")]
    InvalidIdentity(String),

    #[error("field '{field}' has a default that does not match its type")]
    DefaultTypeMismatch { field: String },

    #[error("unknown field '{0}'")]
    UnknownField(String),
}
