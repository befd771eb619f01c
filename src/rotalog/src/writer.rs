//! The rotating writer.
//!
//! Every write computes the bucket key for the current instant. While the key
//! matches the open file the bytes go straight to it; when it changes the
//! writer resolves the new filename, opens it, runs retention housekeeping
//! under the advisory lock, and only then swaps the handle.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{self, Clock, LocalClock};
use crate::config::{DEFAULT_ROTATION_INTERVAL, LogSettings, RotationConfig};
use crate::lock::LockGuard;
use crate::pattern::CompiledPattern;
use crate::sweeper::{RetentionSweeper, SweepHandle, SweepOutcome};
use crate::{Result, RotateError};

/// Builder for [`RotateWriter`].
pub struct RotateWriterBuilder {
    pattern: String,
    rotation_interval: Duration,
    max_age: Duration,
    force_new_file: bool,
    clock: Arc<dyn Clock>,
}

impl RotateWriterBuilder {
    fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            max_age: Duration::ZERO,
            force_new_file: false,
            clock: Arc::new(LocalClock),
        }
    }

    /// Width of a rotation bucket. Zero disables truncation.
    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval = interval;
        self
    }

    /// Retention age for rotated files. Zero keeps files forever.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Pick a fresh generational name whenever a new bucket is entered and
    /// its plain filename already exists.
    pub fn force_new_file(mut self, force: bool) -> Self {
        self.force_new_file = force;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<RotateWriter> {
        let pattern = CompiledPattern::compile(&self.pattern)?;

        if !self.rotation_interval.is_zero() && pattern.resolution() > self.rotation_interval {
            warn!(
                pattern = %self.pattern,
                interval_secs = self.rotation_interval.as_secs(),
                "Filename pattern is coarser than the rotation interval; rotations will reuse files"
            );
        }

        let sweeper = RetentionSweeper::new(pattern.discovery_glob(), self.max_age);

        Ok(RotateWriter {
            pattern,
            rotation_interval: self.rotation_interval,
            force_new_file: self.force_new_file,
            clock: self.clock,
            sweeper,
            state: Mutex::new(WriterState::default()),
            sweeps: Mutex::new(SweepTracker::default()),
        })
    }
}

#[derive(Debug, Default)]
struct WriterState {
    bucket_key: String,
    filename: PathBuf,
    generation: u32,
    handle: Option<File>,
    closed: bool,
}

/// Most recent sweep errors kept between calls to `wait_for_sweeps`.
const MAX_TRACKED_ERRORS: usize = 100;

/// Background sweeps started by this writer.
#[derive(Debug, Default)]
struct SweepTracker {
    pending: Vec<SweepHandle>,
    finished: SweepOutcome,
}

impl SweepTracker {
    fn track(&mut self, handle: SweepHandle) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(SweepHandle::is_finished);
        for handle in done {
            self.record(handle.join());
        }
        self.pending = pending;
        self.pending.push(handle);
    }

    fn record(&mut self, outcome: SweepOutcome) {
        self.finished.merge(outcome);
        let errors = &mut self.finished.errors;
        let excess = errors.len().saturating_sub(MAX_TRACKED_ERRORS);
        errors.drain(..excess);
    }
}

/// A file writer that rotates on time-bucket boundaries.
///
/// All writes are serialized by an internal mutex, so a writer can be shared
/// across threads behind an `Arc` and written through `&RotateWriter`.
pub struct RotateWriter {
    pattern: CompiledPattern,
    rotation_interval: Duration,
    force_new_file: bool,
    clock: Arc<dyn Clock>,
    sweeper: RetentionSweeper,
    state: Mutex<WriterState>,
    sweeps: Mutex<SweepTracker>,
}

impl RotateWriter {
    pub fn builder(pattern: impl Into<String>) -> RotateWriterBuilder {
        RotateWriterBuilder::new(pattern)
    }

    pub fn from_config(config: &RotationConfig) -> Result<Self> {
        Self::builder(&config.pattern)
            .rotation_interval(config.rotation_interval())
            .max_age(config.max_age())
            .force_new_file(config.force_new_file)
            .clock(config.clock.clock())
            .build()
    }

    /// Writer for `<root>/<name><pattern>.log`, creating `root` if needed.
    pub fn for_log(settings: &LogSettings) -> Result<Self> {
        if let Err(e) = fs::create_dir_all(&settings.root) {
            warn!(
                root = %settings.root.display(),
                error = %e,
                "Failed to create log root directory"
            );
        }
        Self::from_config(&settings.rotation_config())
    }

    /// Write `buf` to the file for the current bucket, rotating first if the
    /// bucket changed.
    ///
    /// Directory and open failures leave the writer on its previous file. If
    /// the file fails after part of `buf` was written, the short count is
    /// returned instead of the error, as [`io::Write::write`] does.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RotateError::Closed);
        }

        self.rotate_if_needed(&mut state, self.clock.now(), false)?;
        let handle = state
            .handle
            .as_mut()
            .ok_or_else(|| io::Error::other("no open log file"))?;
        Ok(write_reporting_partial(handle, buf)?)
    }

    /// Rotate to the next generational file of the current bucket
    /// (`name.1`, `name.2`, ...) even though the bucket has not changed.
    pub fn rotate(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RotateError::Closed);
        }
        self.rotate_if_needed(&mut state, self.clock.now(), true)
    }

    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(handle) = state.handle.as_mut() {
            handle.flush()?;
        }
        Ok(())
    }

    /// File currently written to, if any.
    pub fn current_filename(&self) -> Option<PathBuf> {
        let state = self.state.lock();
        state.handle.as_ref().map(|_| state.filename.clone())
    }

    /// Generation of the current file within its bucket (0 = plain name).
    pub fn generation(&self) -> u32 {
        self.state.lock().generation
    }

    pub fn discovery_glob(&self) -> &str {
        self.pattern.discovery_glob()
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Wait for every background deletion started so far.
    pub fn wait_for_sweeps(&self) -> SweepOutcome {
        let (pending, mut outcome) = {
            let mut tracker = self.sweeps.lock();
            (
                std::mem::take(&mut tracker.pending),
                std::mem::take(&mut tracker.finished),
            )
        };
        for handle in pending {
            outcome.merge(handle.join());
        }
        outcome
    }

    /// Flush and close the current file and wait for pending sweeps.
    ///
    /// Later writes fail with [`RotateError::Closed`].
    pub fn close(&self) -> Result<()> {
        let handle = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.handle.take()
        };

        let result = match handle {
            Some(mut file) => file.flush().map_err(RotateError::from),
            None => Ok(()),
        };
        self.wait_for_sweeps();
        result
    }

    fn rotate_if_needed(
        &self,
        state: &mut WriterState,
        now: DateTime<FixedOffset>,
        rotate_requested: bool,
    ) -> Result<()> {
        let bucket = clock::truncate(now, self.rotation_interval);
        let bucket_key = self.pattern.format(&bucket.naive_local());

        let mut generation;
        let find_free;
        if state.handle.is_some() && bucket_key == state.bucket_key {
            if !rotate_requested {
                return Ok(());
            }
            generation = state.generation + 1;
            find_free = true;
        } else {
            generation = 0;
            find_free = self.force_new_file || rotate_requested;
        }

        let base = PathBuf::from(&bucket_key);
        let filename = if find_free {
            loop {
                let candidate = generational_name(&base, generation);
                if !candidate.exists() {
                    break candidate;
                }
                generation += 1;
            }
        } else {
            base
        };

        let file = open_for_append(&filename)?;
        self.housekeep(&filename, now);

        let previous = state.handle.replace(file);
        debug!(
            from = %state.filename.display(),
            to = %filename.display(),
            generation,
            "Rotated log file"
        );
        drop(previous);

        state.bucket_key = bucket_key;
        state.filename = filename;
        state.generation = generation;
        Ok(())
    }

    /// Retention sweep under the advisory lock. Never fails the write path.
    fn housekeep(&self, filename: &Path, now: DateTime<FixedOffset>) {
        let Some(cutoff) = self.sweeper.cutoff(SystemTime::from(now)) else {
            return;
        };

        let lock = match LockGuard::try_acquire(filename) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                debug!(path = %filename.display(), "Another writer is sweeping, skipping retention");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to acquire rotation lock, skipping retention");
                return;
            }
        };

        match self.sweeper.sweep(cutoff, Some(filename)) {
            Ok(Some(handle)) => self.sweeps.lock().track(handle),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Retention sweep failed"),
        }

        drop(lock);
    }
}

impl std::fmt::Debug for RotateWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotateWriter")
            .field("pattern", &self.pattern.template())
            .field("rotation_interval", &self.rotation_interval)
            .field("force_new_file", &self.force_new_file)
            .field("clock", &self.clock)
            .field("sweeper", &self.sweeper)
            .finish_non_exhaustive()
    }
}

impl Write for RotateWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotateWriter::write(&*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotateWriter::flush(&*self).map_err(Into::into)
    }
}

impl Write for &RotateWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotateWriter::write(*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotateWriter::flush(*self).map_err(Into::into)
    }
}

impl Drop for RotateWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close rotating writer");
        }
    }
}

/// Write all of `buf`, or as much as went through before an error.
///
/// Fails only when nothing at all was written.
fn write_reporting_partial<W: Write>(out: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match out.write(&buf[written..]) {
            Ok(0) if written == 0 => return Err(io::ErrorKind::WriteZero.into()),
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if written == 0 => return Err(e),
            Err(e) => {
                warn!(written, len = buf.len(), error = %e, "Short write to log file");
                break;
            }
        }
    }
    Ok(written)
}

/// `base` for generation 0, `base.<n>` otherwise.
fn generational_name(base: &Path, generation: u32) -> PathBuf {
    if generation == 0 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

fn open_for_append(filename: &Path) -> Result<File> {
    if let Some(dir) = filename.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| RotateError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)
        .map_err(|source| RotateError::Open {
            path: filename.to_path_buf(),
            source,
        })
}
