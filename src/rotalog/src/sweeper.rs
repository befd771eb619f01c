//! Retention sweeps over previously rotated files.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::lock::LOCK_SUFFIX;
use crate::{Result, RotateError};

/// Suffix of temporary link artifacts that share the discovery glob.
pub const SYMLINK_SUFFIX: &str = "_symlink";

/// A rotated file eligible for deletion.
#[derive(Debug, Clone)]
pub struct StaleFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepOutcome {
    /// Number of files deleted.
    pub files_deleted: usize,
    /// Total bytes freed.
    pub bytes_freed: u64,
    /// Any errors encountered (non-fatal).
    pub errors: Vec<String>,
}

impl SweepOutcome {
    fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    /// Fold another outcome into this one.
    pub fn merge(&mut self, other: SweepOutcome) {
        self.files_deleted += other.files_deleted;
        self.bytes_freed += other.bytes_freed;
        self.errors.extend(other.errors);
    }
}

/// Background deletion started by [`RetentionSweeper::sweep`].
#[derive(Debug)]
pub struct SweepHandle {
    candidates: usize,
    thread: JoinHandle<SweepOutcome>,
}

impl SweepHandle {
    /// Number of files handed to the background thread.
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the deletions to finish.
    pub fn join(self) -> SweepOutcome {
        self.thread.join().unwrap_or_else(|_| SweepOutcome {
            errors: vec!["sweep thread panicked".to_string()],
            ..Default::default()
        })
    }
}

/// Deletes files matching a discovery glob once they fall behind the
/// retention cutoff.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    glob: String,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(glob: impl Into<String>, max_age: Duration) -> Self {
        Self {
            glob: glob.into(),
            max_age,
        }
    }

    /// A zero max age disables retention: nothing is ever deleted.
    pub fn is_enabled(&self) -> bool {
        !self.max_age.is_zero()
    }

    /// Cutoff for a sweep run at `now`, or `None` when retention is disabled.
    pub fn cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        if !self.is_enabled() {
            return None;
        }
        now.checked_sub(self.max_age)
    }

    /// Enumerate files whose modification time is at or before `cutoff`.
    ///
    /// `keep` names the file a writer is about to write to; it is never a
    /// candidate, however old its modification time.
    pub fn collect(&self, cutoff: SystemTime, keep: Option<&Path>) -> Result<Vec<StaleFile>> {
        let paths = glob::glob(&self.glob).map_err(|e| RotateError::Sweep {
            pattern: self.glob.clone(),
            reason: e.to_string(),
        })?;

        let keep = keep.map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()));

        let mut stale = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable sweep entry");
                    continue;
                }
            };
            if is_artifact(&path) {
                continue;
            }
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified > cutoff {
                continue;
            }
            if keep.as_deref().is_some_and(|k| is_same_file(&path, k)) {
                debug!(path = %path.display(), "Keeping active file out of retention sweep");
                continue;
            }
            stale.push(StaleFile {
                path,
                size: metadata.len(),
                modified,
            });
        }
        Ok(stale)
    }

    /// Collect stale files and delete them on a detached thread.
    ///
    /// Returns `Ok(None)` when nothing is stale. Deletion failures end up in
    /// the joined [`SweepOutcome`] and are retried on the next sweep.
    pub fn sweep(&self, cutoff: SystemTime, keep: Option<&Path>) -> Result<Option<SweepHandle>> {
        let stale = self.collect(cutoff, keep)?;
        if stale.is_empty() {
            return Ok(None);
        }

        let candidates = stale.len();
        debug!(pattern = %self.glob, candidates, "Scheduling retention sweep");

        let thread = thread::Builder::new()
            .name("rotalog-sweep".to_string())
            .spawn(move || remove_stale(stale))
            .map_err(|e| RotateError::Sweep {
                pattern: self.glob.clone(),
                reason: format!("failed to spawn sweep thread: {e}"),
            })?;

        Ok(Some(SweepHandle { candidates, thread }))
    }
}

fn remove_stale(stale: Vec<StaleFile>) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    for file in stale {
        match fs::remove_file(&file.path) {
            Ok(()) => {
                outcome.files_deleted += 1;
                outcome.bytes_freed += file.size;
                info!(path = %file.path.display(), "Deleted expired log file");
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Failed to delete expired log file");
                outcome.add_error(format!("Failed to delete {}: {}", file.path.display(), e));
            }
        }
    }
    outcome
}

fn is_same_file(candidate: &Path, keep: &Path) -> bool {
    candidate == keep || fs::canonicalize(candidate).is_ok_and(|c| c == keep)
}

/// Lock sentinels and link artifacts match the glob but are never swept.
fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(LOCK_SUFFIX) || name.ends_with(SYMLINK_SUFFIX))
}
