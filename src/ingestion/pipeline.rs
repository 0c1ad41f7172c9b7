//! One import, end to end.
//!
//! [`Importer::import`] runs the stages in order and always hands back an
//! [`IngestionReport`], even when a stage fails:
//!
//! 1. parse the upload into a [`crate::types::RawTable`]
//! 2. resolve catalog fields to headers and check required fields
//! 3. build one record per row, collecting rejected rows
//! 4. purge existing records (replace mode)
//! 5. persist accepted records in batches
//!
//! The purge runs only once records have been built, so an upload that cannot be imported
//! never wipes the table. The whole import holds the [`ImportLocks`] entry named after the
//! store's target and, for stores that name one, a [`FileLock`] on the store's lock file.
//!
//! If an [`IngestionObserver`] is configured it receives `on_success` or `on_failure`, plus
//! `on_alert` when the failure's severity is at or above `alert_at_or_above`.

use std::fmt;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::error::{ImportError, ImportResult};
use crate::lock::{FileLock, ImportLocks};
use crate::persist::{self, BatchPersister, CommitMode, DEFAULT_BATCH_SIZE};
use crate::report::{DEFAULT_MAX_REPORTED_ERRORS, ImportOutcome, IngestionReport};
use crate::storage::RecordStore;

use super::csv::{TabularFormat, Upload, parse_upload};
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use super::preview::{self, PreviewReport};
use super::record::RecordBuilder;
use super::resolve::{MatchPolicy, resolve_columns};

/// Row errors carried by [`ImportError::NoValidRecords`].
const NO_VALID_RECORDS_SAMPLE: usize = 5;

/// Options controlling one import.
///
/// Use [`Default`] for the common case: append, batches of 1000, incremental commits,
/// first-match resolution, the catalog's own required fields.
#[derive(Clone)]
pub struct ImportOptions {
    /// If `None`, the format is inferred from the upload's filename.
    pub format: Option<TabularFormat>,
    /// Delete existing records before loading.
    pub replace: bool,
    /// Records per committed batch.
    pub batch_size: usize,
    pub commit_mode: CommitMode,
    pub match_policy: MatchPolicy,
    /// Replaces the catalog's required fields when set.
    pub required_fields: Option<Vec<String>>,
    /// Row errors listed in a response before truncation.
    pub max_reported_errors: usize,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("format", &self.format)
            .field("replace", &self.replace)
            .field("batch_size", &self.batch_size)
            .field("commit_mode", &self.commit_mode)
            .field("match_policy", &self.match_policy)
            .field("required_fields", &self.required_fields)
            .field("max_reported_errors", &self.max_reported_errors)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: None,
            replace: false,
            batch_size: DEFAULT_BATCH_SIZE,
            commit_mode: CommitMode::default(),
            match_policy: MatchPolicy::default(),
            required_fields: None,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

impl ImportOptions {
    /// Fields that must resolve for the import to proceed.
    pub fn required_fields(&self, catalog: &Catalog) -> Vec<String> {
        match &self.required_fields {
            Some(fields) => fields.clone(),
            None => catalog.required_fields(),
        }
    }
}

/// Runs imports against a fixed catalog.
pub struct Importer {
    catalog: Catalog,
    clock: Arc<dyn Clock>,
    locks: Arc<ImportLocks>,
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("fields", &self.catalog.fields().len())
            .field("locks", &self.locks)
            .finish()
    }
}

impl Importer {
    /// An importer using the system clock and the process-wide lock registry.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            clock: Arc::new(SystemClock),
            locks: ImportLocks::global(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_locks(mut self, locks: Arc<ImportLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Import `upload` into `store`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabular_import::catalog::Catalog;
    /// use tabular_import::ingestion::{ImportOptions, Importer, Upload};
    /// use tabular_import::storage::MemoryStore;
    ///
    /// let importer = Importer::new(Catalog::sales());
    /// let mut store = MemoryStore::new("client_data");
    /// let upload = Upload::new("sales.csv", "Fecha,Cliente,Venta\n2024-01-05,Acme,\"1,250.00\"\n");
    ///
    /// let report = importer.import(&upload, &mut store, &ImportOptions::default());
    /// assert!(report.success());
    /// assert_eq!(report.saved_rows, 1);
    /// ```
    pub fn import(&self, upload: &Upload, store: &mut dyn RecordStore, options: &ImportOptions) -> IngestionReport {
        let target = store.target().to_owned();
        let span = tracing::info_span!("import", filename = %upload.filename, target = %target);
        let _enter = span.enter();

        let guard = self.locks.acquire(&target);
        if !guard.waited().is_zero() {
            tracing::info!(waited_ms = guard.waited().as_millis() as u64, "import lock acquired after waiting");
        }
        let mut report = IngestionReport::new(&upload.filename);
        match lock_target(store) {
            Ok(file_lock) => {
                tracing::info!(replace = options.replace, commit_mode = ?options.commit_mode, "import started");
                self.run(upload, store, options, &mut report);
                drop(file_lock);
            }
            Err(e) => report.fail(ImportOutcome::LockFailed, e),
        }
        drop(guard);

        match &report.fatal {
            None => tracing::info!(
                total = report.total_rows,
                processed = report.processed_rows,
                saved = report.saved_rows,
                rejected = report.errors.len(),
                "import finished"
            ),
            Some(e) => tracing::error!(outcome = ?report.outcome, saved = report.saved_rows, "import failed: {e}"),
        }

        let ctx = IngestionContext {
            filename: upload.filename.clone(),
            target,
            replace: options.replace,
        };
        notify(&ctx, &report, options);
        report
    }

    /// Parse and resolve `upload` without touching any store.
    pub fn preview(&self, upload: &Upload, options: &ImportOptions, sample_rows: usize) -> ImportResult<PreviewReport> {
        preview::preview(upload, &self.catalog, options, sample_rows)
    }

    fn run(&self, upload: &Upload, store: &mut dyn RecordStore, options: &ImportOptions, report: &mut IngestionReport) {
        let table = match parse_upload(upload, options.format) {
            Ok(t) => t,
            Err(e) => return report.fail(ImportOutcome::ParseFailed, e),
        };
        report.total_rows = table.row_count();
        report.columns_found = table.headers.clone();

        let mapping = resolve_columns(&table.headers, &self.catalog, options.match_policy);
        tracing::debug!(matched = ?mapping.matched(), "columns resolved");
        for field in mapping.unmatched_fields() {
            tracing::warn!(%field, "no header matched field");
        }

        let missing = mapping.missing_required(&options.required_fields(&self.catalog));
        if !missing.is_empty() {
            report.mapping = Some(mapping);
            return report.fail(
                ImportOutcome::Rejected,
                ImportError::MissingRequiredColumns {
                    missing,
                    headers: table.headers,
                },
            );
        }

        let now = self.clock.now();
        let (records, errors) =
            RecordBuilder::new(&self.catalog, &mapping, &upload.filename, table.headers.len(), now).build_all(&table.rows);
        report.mapping = Some(mapping);
        report.processed_rows = records.len();
        report.errors = errors;

        if records.is_empty() {
            let first_errors = report
                .errors
                .iter()
                .take(NO_VALID_RECORDS_SAMPLE)
                .map(ToString::to_string)
                .collect();
            return report.fail(ImportOutcome::Rejected, ImportError::NoValidRecords { first_errors });
        }

        let persister = BatchPersister::new(options.batch_size);
        let outcome = match options.commit_mode {
            CommitMode::Incremental => {
                match persist::purge_if_requested(store, options.replace) {
                    Ok(deleted) => report.deleted_rows = deleted,
                    Err(e) => return report.fail(ImportOutcome::DeleteFailed, e),
                }
                persister.persist(store, &records)
            }
            CommitMode::AllOrNothing => {
                let out = persister.persist_atomic(store, &records, options.replace);
                report.deleted_rows = out.deleted;
                out
            }
        };

        report.saved_rows = outcome.saved;
        report.batches_committed = outcome.batches_committed;
        report.batches_total = outcome.batches_total;
        if let Some(e) = outcome.failure {
            report.fail(ImportOutcome::PersistFailed, e);
        }
    }
}

/// Take the store's lock file, if it names one.
fn lock_target(store: &dyn RecordStore) -> ImportResult<Option<FileLock>> {
    let Some(path) = store.lock_path() else {
        return Ok(None);
    };
    match FileLock::acquire(&path) {
        Ok(lock) => {
            if !lock.waited().is_zero() {
                tracing::info!(
                    path = %path.display(),
                    waited_ms = lock.waited().as_millis() as u64,
                    "lock file acquired after waiting"
                );
            }
            Ok(Some(lock))
        }
        Err(source) => Err(ImportError::Lock { path, source }),
    }
}

fn notify(ctx: &IngestionContext, report: &IngestionReport, options: &ImportOptions) {
    let Some(obs) = options.observer.as_ref() else {
        return;
    };
    match &report.fatal {
        None => obs.on_success(
            ctx,
            IngestionStats {
                rows: report.total_rows,
                processed: report.processed_rows,
                saved: report.saved_rows,
                rejected: report.errors.len(),
            },
        ),
        Some(e) => {
            let sev = IngestionSeverity::for_error(e);
            obs.on_failure(ctx, sev, e);
            if sev >= options.alert_at_or_above {
                obs.on_alert(ctx, sev, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldSpec;
    use crate::clock::FixedClock;
    use crate::storage::MemoryStore;
    use chrono::NaiveDate;

    fn importer() -> Importer {
        let now = NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap();
        let catalog = Catalog::new(vec![
            FieldSpec::text("client_name", &["cliente"]).identity(),
            FieldSpec::decimal("value", &["venta"]),
        ])
        .unwrap();
        Importer::new(catalog)
            .with_clock(Arc::new(FixedClock(now)))
            .with_locks(Arc::new(ImportLocks::new()))
    }

    #[test]
    fn parse_failure_is_reported_not_returned() {
        let mut store = MemoryStore::new("t");
        let report = importer().import(&Upload::new("x.xlsx", "a"), &mut store, &ImportOptions::default());
        assert_eq!(report.outcome, ImportOutcome::ParseFailed);
        assert!(matches!(report.fatal, Some(ImportError::UnsupportedFormat { .. })));
        assert_eq!(store.commit_attempts(), 0);
    }

    #[test]
    fn missing_required_column_rejects_before_purge() {
        let mut store = MemoryStore::new("t");
        let opts = ImportOptions {
            replace: true,
            ..ImportOptions::default()
        };
        let report = importer().import(&Upload::new("x.csv", "Venta\n1\n"), &mut store, &opts);
        assert_eq!(report.outcome, ImportOutcome::Rejected);
        match &report.fatal {
            Some(ImportError::MissingRequiredColumns { missing, .. }) => assert_eq!(missing, &["client_name"]),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(report.deleted_rows, None);
    }

    #[test]
    fn required_fields_override() {
        let mut store = MemoryStore::new("t");
        let opts = ImportOptions {
            required_fields: Some(vec!["client_name".to_string(), "value".to_string()]),
            ..ImportOptions::default()
        };
        let report = importer().import(&Upload::new("x.csv", "Cliente\nAcme\n"), &mut store, &opts);
        assert_eq!(report.outcome, ImportOutcome::Rejected);
    }

    #[test]
    fn lock_is_released_after_import() {
        let locks = Arc::new(ImportLocks::new());
        let imp = importer().with_locks(Arc::clone(&locks));
        let mut store = MemoryStore::new("client_data");
        imp.import(&Upload::new("x.csv", "Cliente\nAcme\n"), &mut store, &ImportOptions::default());
        assert!(!locks.is_held("client_data"));
    }

    #[test]
    fn unusable_lock_file_fails_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain");
        std::fs::write(&not_a_dir, b"x").unwrap();

        let mut store = MemoryStore::new("t").with_lock_path(not_a_dir.join("t.lock"));
        let report = importer().import(&Upload::new("x.csv", "Cliente\nAcme\n"), &mut store, &ImportOptions::default());
        assert_eq!(report.outcome, ImportOutcome::LockFailed);
        assert!(matches!(report.fatal, Some(ImportError::Lock { .. })));
        assert!(report.message().starts_with("Could not lock the target table"));
        assert_eq!(report.total_rows, 0);
        assert_eq!(store.commit_attempts(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn import_waits_for_the_lock_file() {
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("t.lock");
        let held = FileLock::acquire(&lock_path).unwrap();

        let p = lock_path.clone();
        let h = std::thread::spawn(move || {
            let mut store = MemoryStore::new("t").with_lock_path(p);
            let report = importer().import(&Upload::new("x.csv", "Cliente\nAcme\n"), &mut store, &ImportOptions::default());
            (report.success(), store.records().len())
        });

        std::thread::sleep(Duration::from_millis(100));
        assert!(!h.is_finished());
        drop(held);
        assert_eq!(h.join().unwrap(), (true, 1));
    }
}
