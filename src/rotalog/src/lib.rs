//! Time-bucketed rotating file writer.
//!
//! Routes written bytes into files named from a strftime-style template,
//! switching files whenever the current instant crosses a rotation
//! boundary and purging files older than a retention window.
//!
//! # Features
//!
//! - **Time Buckets**: `%Y`, `%m`, `%d`, `%H`, `%M`, `%S` and friends pick the file
//! - **Local-Time Truncation**: daily buckets begin at local midnight
//! - **Generational Names**: `app.log.1`, `app.log.2`, ... when a fresh file is forced
//! - **Advisory Locking**: `<file>_lock` sentinels keep concurrent writers from sweeping together
//! - **Background Retention**: expired files are deleted off the write path
//!
//! # Example
//!
//! ```rust,no_run
//! use rotalog::RotateWriter;
//! use std::time::Duration;
//!
//! let writer = RotateWriter::builder("/var/log/app/app-%Y-%m-%d.log")
//!     .rotation_interval(Duration::from_secs(24 * 60 * 60))
//!     .max_age(Duration::from_secs(7 * 24 * 60 * 60))
//!     .build()
//!     .expect("valid pattern");
//!
//! writer.write(b"service started\n").expect("write failed");
//! writer.close().expect("close failed");
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod pattern;
pub mod sweeper;
pub mod writer;

pub use clock::{Clock, ClockKind, LocalClock, ManualClock, UtcClock, truncate};
pub use config::{
    DEFAULT_MAX_AGE, DEFAULT_PATTERN, DEFAULT_ROTATION_INTERVAL, LogSettings, RotationConfig,
    format_duration, parse_duration,
};
pub use error::{Result, RotateError};
pub use lock::{LOCK_SUFFIX, LockGuard, STALE_LOCK_AGE};
pub use pattern::CompiledPattern;
pub use sweeper::{RetentionSweeper, StaleFile, SweepHandle, SweepOutcome};
pub use writer::{RotateWriter, RotateWriterBuilder};
