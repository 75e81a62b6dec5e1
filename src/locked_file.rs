//! Advisory-locked trace file handle
//!
//! [`LockedFile`] pairs a file handle with a `flock(2)` advisory lock. The
//! lock brackets every open/write/close cycle that touches the shared trace
//! file: exclusive for the master's one-time header write and for every
//! batch append, so the file is single-writer at any instant across the
//! whole process family. The lock is advisory — it only excludes writers
//! that also take it, which every member of the family does.

use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while touching the shared trace file.
///
/// These never propagate to instrumentation call sites; the flush path logs
/// them at warning level and drops the batch.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to open trace file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to lock trace file {}: {errno}", path.display())]
    Lock {
        path: PathBuf,
        errno: nix::errno::Errno,
    },
    #[error("failed to write trace file: {0}")]
    Write(#[from] io::Error),
}

/// Requested lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    fn as_flock_arg(self) -> FlockArg {
        match self {
            LockMode::Shared => FlockArg::LockShared,
            LockMode::Exclusive => FlockArg::LockExclusive,
        }
    }
}

/// A file handle holding a `flock(2)` advisory lock for its whole lifetime.
///
/// Dropping the handle releases the lock and closes the file.
#[derive(Debug)]
pub struct LockedFile {
    file: Flock<File>,
    path: PathBuf,
}

impl LockedFile {
    /// Open (creating if needed) in append mode and take the lock.
    ///
    /// Blocks until the lock is granted if another process in the family is
    /// mid-flush.
    pub fn append(path: &Path, mode: LockMode) -> Result<Self, TraceError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| TraceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::with_lock(file, path, mode)
    }

    /// Open for writing, take the exclusive lock, then truncate.
    ///
    /// Truncation happens only after the lock is held, so a header write can
    /// never clobber an append that another process has in flight.
    pub fn create_truncate(path: &Path) -> Result<Self, TraceError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|source| TraceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let mut locked = Self::with_lock(file, path, LockMode::Exclusive)?;
        locked.file.set_len(0)?;
        locked.file.seek(SeekFrom::Start(0))?;
        Ok(locked)
    }

    fn with_lock(file: File, path: &Path, mode: LockMode) -> Result<Self, TraceError> {
        let file = Flock::lock(file, mode.as_flock_arg()).map_err(|(_, errno)| {
            TraceError::Lock {
                path: path.to_path_buf(),
                errno,
            }
        })?;
        Ok(LockedFile {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly. Dropping the handle does the same.
    pub fn unlock(self) -> Result<(), TraceError> {
        let path = self.path;
        self.file
            .unlock()
            .map(drop)
            .map_err(|(_, errno)| TraceError::Lock { path, errno })
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_truncate_discards_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.trace");
        fs::write(&path, "stale content").unwrap();

        let mut file = LockedFile::create_truncate(&path).unwrap();
        file.write_all(b"[\n").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&path).unwrap(), "[\n");
    }

    #[test]
    fn test_append_preserves_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.trace");
        fs::write(&path, "[\n").unwrap();

        let mut file = LockedFile::append(&path, LockMode::Exclusive).unwrap();
        file.write_all(b"  {},\n").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&path).unwrap(), "[\n  {},\n");
    }

    #[test]
    fn test_exclusive_lock_excludes_second_locker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.trace");

        let held = LockedFile::append(&path, LockMode::Exclusive).unwrap();

        // A non-blocking attempt from a second handle must be refused while
        // the first lock is held, and succeed once it is released.
        let probe = OpenOptions::new().append(true).open(&path).unwrap();
        let denied = Flock::lock(probe, FlockArg::LockExclusiveNonblock);
        assert!(denied.is_err());

        held.unlock().unwrap();
        let probe = OpenOptions::new().append(true).open(&path).unwrap();
        assert!(Flock::lock(probe, FlockArg::LockExclusiveNonblock).is_ok());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.trace");
        fs::write(&path, "").unwrap();

        let _first = LockedFile::append(&path, LockMode::Shared).unwrap();
        let probe = OpenOptions::new().append(true).open(&path).unwrap();
        assert!(Flock::lock(probe, FlockArg::LockSharedNonblock).is_ok());
    }

    #[test]
    fn test_open_failure_reports_path() {
        let err = LockedFile::append(Path::new("/nonexistent-dir/out.trace"), LockMode::Exclusive)
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent-dir/out.trace"));
    }
}
