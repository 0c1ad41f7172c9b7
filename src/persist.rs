//! Replace-or-append control and batched persistence.
//!
//! Two commit modes are offered:
//!
//! - [`CommitMode::Incremental`]: the purge commits on its own, then records are written in
//!   fixed-size batches that each commit independently. A failing batch is rolled back and the
//!   remaining batches are skipped; batches committed before it stay persisted.
//! - [`CommitMode::AllOrNothing`]: purge and every record share one transaction.

use std::ops::Range;

use serde::Deserialize;

use crate::error::{ImportError, ImportResult};
use crate::storage::RecordStore;
use crate::types::CanonicalRecord;

/// Batch size used when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// How accepted records are committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One transaction per batch; partial persistence on failure.
    #[default]
    Incremental,
    /// One transaction for the purge and all batches.
    AllOrNothing,
}

/// Delete every stored record when `replace` is set.
///
/// Returns the number of records removed, or `None` in append mode. A failure is fatal and is
/// reported as [`ImportError::Deletion`]; callers must not write anything after it.
pub fn purge_if_requested(store: &mut dyn RecordStore, replace: bool) -> ImportResult<Option<usize>> {
    if !replace {
        tracing::debug!(target_table = store.target(), "append mode, keeping existing records");
        return Ok(None);
    }
    match store.delete_all() {
        Ok(n) => {
            tracing::info!(target_table = store.target(), deleted = n, "existing records deleted");
            Ok(Some(n))
        }
        Err(source) => {
            tracing::error!(target_table = store.target(), "delete failed: {source}");
            Err(ImportError::Deletion { source })
        }
    }
}

/// What a persistence run achieved.
#[derive(Debug, Default)]
pub struct PersistOutcome {
    /// Records committed.
    pub saved: usize,
    pub batches_committed: usize,
    pub batches_total: usize,
    /// Records removed by an all-or-nothing purge.
    pub deleted: Option<usize>,
    /// The failure that stopped the run, if any.
    pub failure: Option<ImportError>,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Writes records to a [`RecordStore`] in fixed-size batches.
#[derive(Debug, Clone, Copy)]
pub struct BatchPersister {
    batch_size: usize,
}

impl Default for BatchPersister {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchPersister {
    /// A zero batch size is treated as 1.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `records` records split into.
    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.batch_size)
    }

    /// Insert `records` batch by batch, committing after each one.
    ///
    /// Stops at the first failing batch. The outcome's `saved` counts only records from batches
    /// that committed.
    pub fn persist(&self, store: &mut dyn RecordStore, records: &[CanonicalRecord]) -> PersistOutcome {
        let ranges = chunk_ranges(records.len(), self.batch_size);
        let mut out = PersistOutcome {
            batches_total: ranges.len(),
            ..PersistOutcome::default()
        };

        for (i, range) in ranges.into_iter().enumerate() {
            let batch = i + 1;
            match store.insert_batch(&records[range]) {
                Ok(n) => {
                    out.saved += n;
                    out.batches_committed += 1;
                    tracing::info!("batch {batch}/{} saved: {n} records", out.batches_total);
                }
                Err(source) => {
                    tracing::error!(
                        batch,
                        batches_total = out.batches_total,
                        saved = out.saved,
                        "batch {batch}/{} failed: {source}",
                        out.batches_total
                    );
                    out.failure = Some(ImportError::Persistence {
                        batch,
                        batches_total: out.batches_total,
                        saved_rows: out.saved,
                        source,
                    });
                    break;
                }
            }
        }
        out
    }

    /// Purge (when `purge` is set) and insert every record in a single transaction.
    ///
    /// The whole load counts as one batch. On failure nothing is saved and the store keeps its
    /// prior contents.
    pub fn persist_atomic(
        &self,
        store: &mut dyn RecordStore,
        records: &[CanonicalRecord],
        purge: bool,
    ) -> PersistOutcome {
        match store.load_atomic(records, purge) {
            Ok(load) => {
                tracing::info!(
                    deleted = load.deleted,
                    "all-or-nothing load saved: {} records",
                    load.inserted
                );
                PersistOutcome {
                    saved: load.inserted,
                    batches_committed: 1,
                    batches_total: 1,
                    deleted: load.deleted,
                    failure: None,
                }
            }
            Err(source) => {
                tracing::error!("all-or-nothing load rolled back: {source}");
                PersistOutcome {
                    batches_total: 1,
                    failure: Some(ImportError::Persistence {
                        batch: 1,
                        batches_total: 1,
                        saved_rows: 0,
                        source,
                    }),
                    ..PersistOutcome::default()
                }
            }
        }
    }
}

/// Split `0..len` into consecutive ranges of at most `size` elements.
pub fn chunk_ranges(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    let mut out = Vec::with_capacity(len.div_ceil(size));
    let mut start = 0usize;
    while start < len {
        let end = (start + size).min(len);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{Provenance, Value};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn records(n: usize) -> Vec<CanonicalRecord> {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        (1..=n)
            .map(|row| {
                CanonicalRecord::new(
                    BTreeMap::from([("client_name".to_string(), Value::Text(format!("c{row}")))]),
                    Provenance {
                        filename: "f.csv".to_string(),
                        uploaded_at: ts,
                        row,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn chunk_ranges_cover_everything() {
        assert!(chunk_ranges(0, 3).is_empty());
        assert_eq!(chunk_ranges(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(chunk_ranges(6, 3), vec![0..3, 3..6]);
        assert_eq!(chunk_ranges(2, 0), vec![0..1, 1..2]);
    }

    #[test]
    fn commits_once_per_batch() {
        let mut store = MemoryStore::new("t");
        let out = BatchPersister::new(3).persist(&mut store, &records(7));
        assert!(out.is_complete());
        assert_eq!(out.saved, 7);
        assert_eq!((out.batches_committed, out.batches_total), (3, 3));
        assert_eq!(store.commit_attempts(), 3);
        assert_eq!(store.records().len(), 7);
    }

    #[test]
    fn failing_batch_keeps_earlier_batches() {
        let mut store = MemoryStore::new("t").failing_commit_at(3);
        let out = BatchPersister::new(2).persist(&mut store, &records(9));
        assert_eq!(out.saved, 4);
        assert_eq!(out.batches_committed, 2);
        assert_eq!(out.batches_total, 5);
        // Batches after the failure are never attempted.
        assert_eq!(store.commit_attempts(), 3);
        assert_eq!(store.records().len(), 4);
        match out.failure {
            Some(ImportError::Persistence {
                batch,
                batches_total,
                saved_rows,
                ..
            }) => assert_eq!((batch, batches_total, saved_rows), (3, 5, 4)),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn empty_input_commits_nothing() {
        let mut store = MemoryStore::new("t");
        let out = BatchPersister::default().persist(&mut store, &[]);
        assert!(out.is_complete());
        assert_eq!(out.batches_total, 0);
        assert_eq!(store.commit_attempts(), 0);
    }

    #[test]
    fn purge_only_in_replace_mode() {
        let mut store = MemoryStore::new("t").with_records(records(4));
        assert_eq!(purge_if_requested(&mut store, false).unwrap(), None);
        assert_eq!(store.records().len(), 4);
        assert_eq!(purge_if_requested(&mut store, true).unwrap(), Some(4));
        assert!(store.records().is_empty());
    }

    #[test]
    fn purge_failure_is_a_deletion_error() {
        let mut store = MemoryStore::new("t").with_records(records(2)).failing_delete();
        let err = purge_if_requested(&mut store, true).unwrap_err();
        assert!(matches!(err, ImportError::Deletion { .. }));
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn atomic_failure_leaves_store_untouched() {
        let mut store = MemoryStore::new("t")
            .with_records(records(3))
            .failing_commit_at(1);
        let out = BatchPersister::new(1).persist_atomic(&mut store, &records(5), true);
        assert!(!out.is_complete());
        assert_eq!(out.saved, 0);
        assert_eq!(out.deleted, None);
        assert_eq!(store.records().len(), 3);
    }

    #[test]
    fn atomic_success_reports_purge() {
        let mut store = MemoryStore::new("t").with_records(records(3));
        let out = BatchPersister::new(2).persist_atomic(&mut store, &records(5), true);
        assert!(out.is_complete());
        assert_eq!(out.deleted, Some(3));
        assert_eq!(out.saved, 5);
        assert_eq!(store.records().len(), 5);
    }

    #[test]
    fn commit_mode_from_config_string() {
        #[derive(Deserialize)]
        struct W {
            mode: CommitMode,
        }
        let w: W = toml::from_str("mode = \"all_or_nothing\"").unwrap();
        assert_eq!(w.mode, CommitMode::AllOrNothing);
    }
}
