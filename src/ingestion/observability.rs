use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};

use crate::error::ImportError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the import failed because of its input).
    Error,
    /// Critical error (I/O or storage failures).
    Critical,
}

impl IngestionSeverity {
    /// Classify a fatal import error.
    pub fn for_error(e: &ImportError) -> Self {
        match e {
            ImportError::Io(_)
            | ImportError::Lock { .. }
            | ImportError::Storage(_)
            | ImportError::Deletion { .. }
            | ImportError::Persistence { .. } => Self::Critical,
            ImportError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Error,
            },
            ImportError::Toml(_)
            | ImportError::UnsupportedFormat { .. }
            | ImportError::Decode { .. }
            | ImportError::EmptyTable { .. }
            | ImportError::MissingRequiredColumns { .. }
            | ImportError::NoValidRecords { .. }
            | ImportError::Catalog(_)
            | ImportError::Config { .. } => Self::Error,
        }
    }
}

/// Context about an import attempt.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// Upload filename.
    pub filename: String,
    /// Storage target (table) the import writes to.
    pub target: String,
    /// Whether existing records were to be replaced.
    pub replace: bool,
}

/// Counters reported on a completed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Data rows read from the upload.
    pub rows: usize,
    /// Rows that produced a record.
    pub processed: usize,
    /// Records persisted.
    pub saved: usize,
    /// Rows rejected.
    pub rejected: usize,
}

/// Receives the outcome of every import.
///
/// All methods default to doing nothing.
pub trait IngestionObserver: Send + Sync {
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &ImportError) {}

    /// Called after [`Self::on_failure`] when the severity reaches the import's alert threshold.
    fn on_alert(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &ImportError) {}
}

/// Forwards every event to each wrapped observer, in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }

    fn each(&self, event: impl Fn(&dyn IngestionObserver)) {
        self.observers.iter().for_each(|o| event(o.as_ref()));
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ImportError) {
        self.each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ImportError) {
        self.each(|o| o.on_alert(ctx, severity, error));
    }
}

/// Emits import outcomes as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            filename = %ctx.filename,
            target = %ctx.target,
            rows = stats.rows,
            processed = stats.processed,
            saved = stats.saved,
            rejected = stats.rejected,
            "import completed"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ImportError) {
        tracing::error!(
            filename = %ctx.filename,
            target = %ctx.target,
            ?severity,
            "import failed: {error}"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ImportError) {
        tracing::error!(
            alert = true,
            filename = %ctx.filename,
            target = %ctx.target,
            ?severity,
            "import failed: {error}"
        );
    }
}

/// Appends one line per import event to an event log:
///
/// ```text
/// 2025-03-01T09:15:00Z ok target=client_data file=sales.csv replace=true rows=5 processed=5 saved=5 rejected=0
/// 2025-03-01T09:16:00Z fail target=client_data file=sales.csv severity=Critical err=...
/// ```
///
/// The file is opened on the first event and kept open. Write failures are logged, never
/// propagated.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileObserver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    fn write_event(&self, kind: &str, ctx: &IngestionContext, detail: fmt::Arguments<'_>) {
        let mut slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(f) => *slot = Some(f),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "cannot open event log: {e}");
                    return;
                }
            }
        }
        let Some(f) = slot.as_mut() else {
            return;
        };
        let written = writeln!(
            f,
            "{} {kind} target={} file={} {detail}",
            timestamp(),
            ctx.target,
            ctx.filename
        );
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), "cannot write event log: {e}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.write_event(
            "ok",
            ctx,
            format_args!(
                "replace={} rows={} processed={} saved={} rejected={}",
                ctx.replace, stats.rows, stats.processed, stats.saved, stats.rejected
            ),
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ImportError) {
        self.write_event("fail", ctx, format_args!("severity={severity:?} err={error}"));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ImportError) {
        self.write_event("ALERT", ctx, format_args!("severity={severity:?} err={error}"));
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
