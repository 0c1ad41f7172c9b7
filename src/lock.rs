//! Named import locks.
//!
//! Two imports into the same table must not interleave their purge and insert phases. Every
//! import holds the lock named after its storage target for its whole duration; imports into
//! different targets do not wait for each other.
//!
//! [`ImportLocks`] serialises threads of one process. Stores backed by a file also name a lock
//! file ([`crate::storage::RecordStore::lock_path`]); the importer holds an advisory
//! [`FileLock`] on it so separate processes writing the same table wait for each other too.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// A registry of named, blocking, non-reentrant locks.
#[derive(Debug, Default)]
pub struct ImportLocks {
    held: Mutex<HashSet<String>>,
    cv: Condvar,
}

impl ImportLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by importers that are not given their own.
    pub fn global() -> Arc<ImportLocks> {
        static GLOBAL: OnceLock<Arc<ImportLocks>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ImportLocks::new())))
    }

    /// Acquire `name`, blocking until no other guard holds it.
    ///
    /// Acquiring a name already held by the current thread deadlocks.
    pub fn acquire(&self, name: &str) -> ImportGuard<'_> {
        let start = Instant::now();
        let mut waited = false;
        let mut held = self.lock_held();
        while held.contains(name) {
            waited = true;
            held = self.cv.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(name.to_owned());
        ImportGuard {
            locks: self,
            name: name.to_owned(),
            waited: if waited { start.elapsed() } else { Duration::ZERO },
        }
    }

    /// Acquire `name` only if it is free right now.
    pub fn try_acquire(&self, name: &str) -> Option<ImportGuard<'_>> {
        let mut held = self.lock_held();
        if !held.insert(name.to_owned()) {
            return None;
        }
        Some(ImportGuard {
            locks: self,
            name: name.to_owned(),
            waited: Duration::ZERO,
        })
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.lock_held().contains(name)
    }

    fn lock_held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, name: &str) {
        self.lock_held().remove(name);
        self.cv.notify_all();
    }
}

/// Holds one named lock until dropped.
#[derive(Debug)]
pub struct ImportGuard<'a> {
    locks: &'a ImportLocks,
    name: String,
    waited: Duration,
}

impl ImportGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time spent blocked before the lock was granted (zero if it was free).
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for ImportGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.name);
    }
}

/// Lock file guarding `table` in the database at `database`: `<database>.<table>.lock`.
pub fn lock_file_for(database: &Path, table: &str) -> PathBuf {
    let mut name = database.as_os_str().to_owned();
    name.push(format!(".{table}.lock"));
    PathBuf::from(name)
}

/// Exclusive advisory lock on a file, released on drop or when the process exits.
///
/// On non-unix targets the file is created but not locked.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    waited: Duration,
}

impl FileLock {
    /// Lock `path`, creating it if needed and blocking while another holder has it.
    pub fn acquire(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;
        let start = Instant::now();
        let waited = match sys::try_lock(&file)? {
            true => Duration::ZERO,
            false => {
                tracing::debug!(path = %path.display(), "waiting for lock file");
                sys::lock(&file)?;
                start.elapsed()
            }
        };
        Ok(Self { file, path, waited })
    }

    /// Lock `path` only if no other holder has it right now.
    pub fn try_acquire(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;
        if !sys::try_lock(&file)? {
            return Ok(None);
        }
        Ok(Some(Self {
            file,
            path,
            waited: Duration::ZERO,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time spent blocked before the lock was granted (zero if it was free).
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        sys::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    fn flock(file: &File, op: libc::c_int) -> io::Result<()> {
        loop {
            // SAFETY: the descriptor is owned by `file`, which outlives the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    pub(super) fn lock(file: &File) -> io::Result<()> {
        flock(file, libc::LOCK_EX)
    }

    pub(super) fn try_lock(file: &File) -> io::Result<bool> {
        match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(super) fn unlock(file: &File) {
        let _ = flock(file, libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    pub(super) fn lock(_file: &File) -> io::Result<()> {
        Ok(())
    }

    pub(super) fn try_lock(_file: &File) -> io::Result<bool> {
        Ok(true)
    }

    pub(super) fn unlock(_file: &File) {}
}
