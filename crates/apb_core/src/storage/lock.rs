//! Advisory lock files.
//!
//! A lock is a sibling file (`<target>.lock`) created with exclusive-create
//! semantics. Holding the [`FileLock`] value means holding the lock; it is
//! released on drop. Locks older than the stale threshold are assumed to
//! belong to a crashed process and are reclaimed.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use uuid::Uuid;

/// Default time to wait for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lock files older than this are considered abandoned.
const STALE_AFTER: Duration = Duration::from_secs(120);

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Errors from lock acquisition.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Timed out after {waited:?} waiting for lock {path}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("Failed to create lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An acquired advisory lock. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock guarding `target`, waiting up to `timeout`.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path_for(target);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let started = SystemTime::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Dropping `lock` on a failed write removes the file again.
                    let lock = Self { path };
                    writeln!(file, "{}", std::process::id()).map_err(|source| LockError::Io {
                        path: lock.path.clone(),
                        source,
                    })?;
                    tracing::trace!("Acquired lock {}", lock.path.display());
                    return Ok(lock);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        reclaim_stale(&path).map_err(|source| LockError::Io {
                            path: path.clone(),
                            source,
                        })?;
                        continue;
                    }
                    let waited = started.elapsed().unwrap_or_default();
                    if waited >= timeout {
                        return Err(LockError::Timeout { path, waited });
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// Remove a stale lock so the caller can retry creating it.
///
/// The lock is first renamed to a name unique to this attempt. Only one of
/// several waiters can win that rename; the rest see `NotFound` and retry.
/// If the claimed file turns out to be fresh, a new holder replaced the
/// stale lock in between and it is moved back.
fn reclaim_stale(path: &Path) -> io::Result<()> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".stale-{}", Uuid::new_v4().simple()));
    let claimed = path.with_file_name(name);

    match fs::rename(path, &claimed) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }

    if is_stale(&claimed) {
        tracing::warn!("Reclaimed stale lock {}", path.display());
        fs::remove_file(&claimed)
    } else {
        tracing::debug!("Lock {} was refreshed; restoring it", path.display());
        fs::rename(&claimed, path)
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}
