use std::sync::{Arc, Mutex};

use tabular_import::catalog::Catalog;
use tabular_import::ingestion::{
    CompositeObserver, FileObserver, ImportOptions, Importer, IngestionContext, IngestionObserver, IngestionSeverity,
    IngestionStats, Upload,
};
use tabular_import::lock::ImportLocks;
use tabular_import::storage::MemoryStore;
use tabular_import::ImportError;

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<IngestionStats>>,
    failures: Mutex<Vec<IngestionSeverity>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_success(&self, _ctx: &IngestionContext, stats: IngestionStats) {
        self.successes.lock().unwrap().push(stats);
    }

    fn on_failure(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &ImportError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &ImportError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn importer() -> Importer {
    Importer::new(Catalog::sales()).with_locks(Arc::new(ImportLocks::new()))
}

fn opts(obs: Arc<dyn IngestionObserver>, replace: bool) -> ImportOptions {
    ImportOptions {
        replace,
        observer: Some(obs),
        alert_at_or_above: IngestionSeverity::Critical,
        ..Default::default()
    }
}

#[test]
fn observer_receives_stats_on_success() {
    let obs = Arc::new(RecordingObserver::default());
    let upload = Upload::from_path("tests/fixtures/messy.csv").unwrap();

    let report = importer().import(&upload, &mut MemoryStore::new("client_data"), &opts(obs.clone(), false));
    assert!(report.success());

    let successes = obs.successes.lock().unwrap().clone();
    assert_eq!(
        successes,
        vec![IngestionStats {
            rows: 5,
            processed: 3,
            saved: 3,
            rejected: 2,
        }]
    );
    assert!(obs.failures.lock().unwrap().is_empty());
}

#[test]
fn observer_receives_failure_and_alert_on_critical_storage_error() {
    let obs = Arc::new(RecordingObserver::default());
    let upload = Upload::from_path("tests/fixtures/sales.csv").unwrap();
    let mut store = MemoryStore::new("client_data").failing_delete();

    let _ = importer().import(&upload, &mut store, &opts(obs.clone(), true));

    assert_eq!(obs.failures.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
}

#[test]
fn observer_receives_failure_without_alert_for_input_error() {
    let obs = Arc::new(RecordingObserver::default());
    let upload = Upload::from_path("tests/fixtures/no_client.csv").unwrap();

    let _ = importer().import(&upload, &mut MemoryStore::new("client_data"), &opts(obs.clone(), false));

    assert_eq!(obs.failures.lock().unwrap().clone(), vec![IngestionSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn alert_threshold_can_be_lowered() {
    let obs = Arc::new(RecordingObserver::default());
    let o = ImportOptions {
        alert_at_or_above: IngestionSeverity::Error,
        ..opts(obs.clone(), false)
    };

    let _ = importer().import(&Upload::new("report.xlsx", "x"), &mut MemoryStore::new("client_data"), &o);

    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Error]);
}

#[test]
fn composite_fans_out_and_file_observer_appends_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("events.log");
    let recorder = Arc::new(RecordingObserver::default());
    let observers: Vec<Arc<dyn IngestionObserver>> = vec![recorder.clone(), Arc::new(FileObserver::new(&log_path))];
    let composite = CompositeObserver::new(observers);
    let o = opts(Arc::new(composite), true);
    let imp = importer();

    let sales = Upload::from_path("tests/fixtures/sales.csv").unwrap();
    let _ = imp.import(&sales, &mut MemoryStore::new("client_data"), &o);
    let _ = imp.import(&sales, &mut MemoryStore::new("client_data").failing_delete(), &o);

    assert_eq!(recorder.successes.lock().unwrap().len(), 1);
    assert_eq!(recorder.alerts.lock().unwrap().len(), 1);

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3, "{contents}");
    assert!(lines[0].contains(" ok target=client_data file=sales.csv replace=true rows=5"));
    assert!(lines[1].contains(" fail target=client_data file=sales.csv severity=Critical err="));
    assert!(lines[2].contains(" ALERT target=client_data file=sales.csv severity=Critical err="));
}

#[derive(Default)]
struct FailureCounter {
    failures: Mutex<usize>,
}

impl IngestionObserver for FailureCounter {
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &ImportError) {
        *self.failures.lock().unwrap() += 1;
    }
}

#[test]
fn alert_is_not_counted_as_a_second_failure() {
    let obs = Arc::new(FailureCounter::default());
    let upload = Upload::from_path("tests/fixtures/sales.csv").unwrap();
    let mut store = MemoryStore::new("client_data").failing_delete();

    let report = importer().import(&upload, &mut store, &opts(obs.clone(), true));
    assert!(!report.success());
    assert_eq!(*obs.failures.lock().unwrap(), 1);
}
