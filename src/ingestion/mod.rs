//! Ingestion stages and the import entrypoint.
//!
//! Most callers should use [`Importer`] (from [`pipeline`]) which:
//!
//! - infers the format from the filename (or you can force one via [`ImportOptions`])
//! - resolves catalog fields to headers, builds typed records and persists them
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]
//!
//! The stages are also usable on their own:
//! - [`csv`]: upload bytes -> raw table
//! - [`resolve`]: canonical field -> header mapping
//! - [`coerce`]: raw cell -> typed value
//! - [`record`]: raw row -> canonical record
//! - [`preview`]: dry-run analysis

pub mod coerce;
pub mod csv;
pub mod observability;
pub mod pipeline;
pub mod preview;
pub mod record;
pub mod resolve;

pub use csv::{TabularFormat, Upload};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
pub use pipeline::{ImportOptions, Importer};
pub use preview::{PreviewReport, preview};
pub use record::{RecordBuilder, RowError, RowErrorKind};
pub use resolve::{ColumnMapping, MatchPolicy, resolve_columns};
