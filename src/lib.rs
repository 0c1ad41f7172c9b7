//! `tabular-import` loads loosely structured CSV exports into a typed relational table.
//!
//! Uploads come with untrusted headers (`"Cliente"`, `" client_name "`, `"Nombre Cliente"`) and
//! inconsistently formatted cells (`"$1,234.50"`, `"05/01/2024"`, `"N/A"`). A declarative
//! [`catalog::Catalog`] lists, for each canonical field, the header spellings accepted for it,
//! its type and its default. The primary entrypoint is [`ingestion::Importer::import`], which:
//!
//! - parses the upload ([`ingestion::csv`]); `.csv`, `.tsv` and `.tab` are recognised
//! - resolves each canonical field to a header ([`ingestion::resolve`])
//! - coerces cells to text / decimal / timestamp, falling back to defaults ([`ingestion::coerce`])
//! - builds one record per row, rejecting rows without an identity value ([`ingestion::record`])
//! - optionally purges the store, then persists in committed batches ([`persist`])
//! - returns an [`report::IngestionReport`], even when a stage fails
//!
//! ## Quick example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use chrono::NaiveDate;
//! use tabular_import::catalog::Catalog;
//! use tabular_import::clock::FixedClock;
//! use tabular_import::ingestion::{ImportOptions, Importer, Upload};
//! use tabular_import::storage::{MemoryStore, RecordStore};
//!
//! let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let importer = Importer::new(Catalog::sales()).with_clock(Arc::new(FixedClock(now)));
//!
//! let upload = Upload::new("ventas.csv", "Fecha,Cliente,Venta\n2024-01-05,Acme,\"1,250.00\"\n,,\n");
//! let mut store = MemoryStore::new("client_data");
//! let report = importer.import(&upload, &mut store, &ImportOptions::default());
//!
//! assert!(report.success());
//! assert_eq!((report.total_rows, report.processed_rows, report.saved_rows), (2, 1, 1));
//! assert_eq!(report.errors[0].row, 2);
//! assert_eq!(store.count().unwrap(), 1);
//!
//! let record = &store.records()[0];
//! assert_eq!(record.get("client_name").as_text(), Some("Acme"));
//! assert_eq!(record.get("value").as_decimal(), Some(1250.0));
//! ```
//!
//! ## Replace vs append
//!
//! With [`ingestion::ImportOptions::replace`] set, every stored record is deleted before the new
//! ones are written; otherwise records are appended (importing the same file twice doubles the
//! row count). The purge only happens once the upload has produced at least one record.
//!
//! Persistence is either [`persist::CommitMode::Incremental`] (one transaction per batch; batches
//! committed before a failure stay) or [`persist::CommitMode::AllOrNothing`].
//!
//! ## SQLite
//!
//! ```no_run
//! use tabular_import::catalog::Catalog;
//! use tabular_import::ingestion::{ImportOptions, Importer, Upload};
//! use tabular_import::storage::SqliteStore;
//!
//! # fn main() -> Result<(), tabular_import::ImportError> {
//! let catalog = Catalog::sales();
//! let mut store = SqliteStore::open("clients.db", "client_data", &catalog)?;
//! let importer = Importer::new(catalog);
//!
//! let opts = ImportOptions {
//!     replace: true,
//!     ..Default::default()
//! };
//! let report = importer.import(&Upload::from_path("ventas.csv")?, &mut store, &opts);
//! println!("{}", serde_json::to_string_pretty(&report.to_response(opts.max_reported_errors)).unwrap());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: parsing, column resolution, coercion, record building, preview, the importer
//! - [`catalog`]: canonical fields and their aliases
//! - [`persist`]: replace/append control and batched persistence
//! - [`storage`]: the [`storage::RecordStore`] sink and its SQLite / in-memory implementations
//! - [`report`]: the per-import report and response
//! - [`lock`]: per-table import serialisation
//! - [`config`], [`logging`], [`clock`], [`types`], [`error`]

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod lock;
pub mod logging;
pub mod persist;
pub mod report;
pub mod storage;
pub mod types;

pub use error::{ImportError, ImportResult};
