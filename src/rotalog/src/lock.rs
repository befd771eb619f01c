//! Advisory lock guarding retention sweeps across writers.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::{Result, RotateError};

/// Suffix appended to a resolved filename to form its lock sentinel.
pub const LOCK_SUFFIX: &str = "_lock";

/// Sentinels older than this are assumed to be left over from a crashed writer.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(3600);

/// Sentinel path for `target`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Per-process counter so that no two sentinels ever carry the same content.
static SENTINEL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Exclusively created sentinel file, removed when the guard is dropped.
///
/// Uses advisory locking via lock files to coordinate between processes.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
    acquired: bool,
}

impl LockGuard {
    /// Attempt to acquire the lock for `target`.
    ///
    /// Returns `Ok(Some(guard))` if the sentinel was created, `Ok(None)` if
    /// another writer holds it, or `Err` if the filesystem refused otherwise.
    pub fn try_acquire(target: &Path) -> Result<Option<Self>> {
        let lock_path = lock_path_for(target);

        match create_sentinel(&lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let Some(snapshot) = stale_contents(&lock_path) else {
                    debug!(lock_path = %lock_path.display(), "Rotation lock held by another writer");
                    return Ok(None);
                };
                if !reclaim_stale(&lock_path, &snapshot) {
                    debug!(lock_path = %lock_path.display(), "Stale rotation lock reclaimed elsewhere");
                    return Ok(None);
                }
                match create_sentinel(&lock_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
                    Err(source) => {
                        return Err(RotateError::Lock {
                            path: lock_path,
                            source,
                        });
                    }
                }
            }
            Err(source) => {
                return Err(RotateError::Lock {
                    path: lock_path,
                    source,
                });
            }
        }

        debug!(lock_path = %lock_path.display(), "Acquired rotation lock");
        Ok(Some(Self {
            lock_path,
            acquired: true,
        }))
    }

    /// Path of the sentinel file.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock.
    pub fn release(&mut self) {
        if self.acquired {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                warn!(
                    error = %e,
                    lock_path = %self.lock_path.display(),
                    "Failed to remove rotation lock file"
                );
            } else {
                debug!(lock_path = %self.lock_path.display(), "Released rotation lock");
            }
            self.acquired = false;
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn create_sentinel(lock_path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let seq = SENTINEL_SEQ.fetch_add(1, Ordering::Relaxed);
    // Holding the file is the lock; the content identifies this sentinel.
    let _ = write!(file, "{}\n{}\n{}", std::process::id(), stamp, seq);
    Ok(())
}

/// Content of the sentinel if it is old enough to be reclaimed.
fn stale_contents(lock_path: &Path) -> Option<Vec<u8>> {
    let age = fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())?;
    if age < STALE_LOCK_AGE {
        return None;
    }
    fs::read(lock_path).ok()
}

/// Remove the sentinel only if it is still the stale one observed as
/// `snapshot`. A writer that reclaimed it first has replaced the content, and
/// its fresh sentinel must survive.
fn reclaim_stale(lock_path: &Path, snapshot: &[u8]) -> bool {
    match fs::read(lock_path) {
        Ok(current) if current == snapshot => {}
        _ => return false,
    }
    warn!(lock_path = %lock_path.display(), "Removing stale rotation lock");
    match fs::remove_file(lock_path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(lock_path = %lock_path.display(), error = %e, "Failed to remove stale rotation lock");
            false
        }
    }
}
