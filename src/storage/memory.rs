use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};
use crate::types::CanonicalRecord;

use super::{AtomicLoad, RecordStore};

/// In-memory [`RecordStore`] for tests and dry runs.
///
/// Every `insert_batch` or `load_atomic` call counts as one commit attempt; a failing attempt
/// leaves the stored records untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    target: String,
    records: Vec<CanonicalRecord>,
    commit_attempts: usize,
    fail_delete: bool,
    fail_commit_at: Option<usize>,
    lock_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Seed the store with existing records.
    pub fn with_records(mut self, records: Vec<CanonicalRecord>) -> Self {
        self.records = records;
        self
    }

    /// Make `delete_all` (and purging loads) fail.
    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Make the `n`-th commit attempt (1-based) fail.
    pub fn failing_commit_at(mut self, n: usize) -> Self {
        self.fail_commit_at = Some(n);
        self
    }

    /// Have imports into this store take an advisory lock on `path`.
    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts
    }

    fn begin_commit(&mut self) -> StorageResult<()> {
        self.commit_attempts += 1;
        if self.fail_commit_at == Some(self.commit_attempts) {
            return Err(StorageError::Rejected {
                operation: "commit".to_owned(),
                message: format!("injected failure on commit {}", self.commit_attempts),
            });
        }
        Ok(())
    }

    fn check_delete(&self) -> StorageResult<()> {
        if self.fail_delete {
            return Err(StorageError::Rejected {
                operation: "delete".to_owned(),
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn target(&self) -> &str {
        &self.target
    }

    fn delete_all(&mut self) -> StorageResult<usize> {
        self.check_delete()?;
        let n = self.records.len();
        self.records.clear();
        Ok(n)
    }

    fn insert_batch(&mut self, batch: &[CanonicalRecord]) -> StorageResult<usize> {
        self.begin_commit()?;
        self.records.extend_from_slice(batch);
        Ok(batch.len())
    }

    fn load_atomic(&mut self, records: &[CanonicalRecord], purge: bool) -> StorageResult<AtomicLoad> {
        if purge {
            self.check_delete()?;
        }
        self.begin_commit()?;
        let deleted = purge.then(|| {
            let n = self.records.len();
            self.records.clear();
            n
        });
        self.records.extend_from_slice(records);
        Ok(AtomicLoad {
            deleted,
            inserted: records.len(),
        })
    }

    fn count(&self) -> StorageResult<usize> {
        Ok(self.records.len())
    }

    fn lock_path(&self) -> Option<PathBuf> {
        self.lock_path.clone()
    }
}
