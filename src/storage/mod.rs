//! Storage sink for canonical records.
//!
//! The import pipeline only needs two transactional operations, `delete_all` and
//! `insert_batch`, plus [`RecordStore::load_atomic`] for all-or-nothing imports.
//!
//! - [`sqlite`]: SQLite table created from the catalog
//! - [`memory`]: vector-backed store with failure injection

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use crate::error::StorageResult;
use crate::types::CanonicalRecord;

/// Outcome of [`RecordStore::load_atomic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicLoad {
    /// Records removed by the purge, if one was requested.
    pub deleted: Option<usize>,
    /// Records inserted.
    pub inserted: usize,
}

/// A table of canonical records.
///
/// Each mutating method is its own transaction: it either commits in full or rolls back and
/// returns an error.
pub trait RecordStore {
    /// Name of the table written to. Imports into the same target are serialised.
    fn target(&self) -> &str;

    /// Delete every record and commit. Returns the number removed.
    fn delete_all(&mut self) -> StorageResult<usize>;

    /// Insert one batch and commit. Returns the number inserted.
    fn insert_batch(&mut self, batch: &[CanonicalRecord]) -> StorageResult<usize>;

    /// Optionally purge, then insert every record, all inside a single transaction.
    fn load_atomic(&mut self, records: &[CanonicalRecord], purge: bool) -> StorageResult<AtomicLoad>;

    /// Number of stored records.
    fn count(&self) -> StorageResult<usize>;

    /// File whose advisory lock serialises imports into this target across processes.
    /// `None` for stores no other process can reach.
    fn lock_path(&self) -> Option<PathBuf> {
        None
    }
}
