//! Measurement log writers.
//!
//! Two modes share the `ResultSink` trait:
//! - `DirectSink` — this process owns the log for the whole run; the header
//!   goes out at open and every row is flushed as soon as it is appended, so
//!   an interrupted run leaves a valid prefix.
//! - `SharedLogSink` — many short-lived processes append to one log. Every
//!   append takes an exclusive advisory lock on a sibling `.lock` file,
//!   writes the header if the log is still empty, appends its row and
//!   flushes before releasing.

use crate::model::Measurement;
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Column order of a direct (single-writer) log.
pub const DIRECT_HEADER: [&str; 3] = ["file", "max_rss", "time"];

/// Column order of a shared (multi-writer) log.
pub const SHARED_HEADER: [&str; 4] = ["file", "max_rss", "time", "type"];

/// Error type for log writing failures.
#[derive(Debug)]
pub enum SinkError {
    Io(io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "log I/O error: {}", e),
            SinkError::Csv(e) => write!(f, "log write error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        SinkError::Csv(e)
    }
}

/// Destination for finished measurements.
pub trait ResultSink {
    /// Appends one measurement as a complete row.
    fn append(&mut self, measurement: &Measurement) -> Result<(), SinkError>;
}

/// Single-writer sink streaming rows to an owned writer.
pub struct DirectSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> DirectSink<W> {
    /// Opens the sink and writes the header immediately.
    ///
    /// The header goes out before any step finishes so that an interrupted
    /// run still leaves a parseable log.
    pub fn new(out: W) -> Result<Self, SinkError> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(DIRECT_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }
}

impl<W: Write> ResultSink for DirectSink<W> {
    fn append(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        self.writer.write_record([
            measurement.file.as_str(),
            &measurement.max_rss.to_string(),
            &measurement.time_secs().to_string(),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Multi-writer sink for concurrent appends from independent processes.
///
/// The lock lives in a sibling file (`<log>.lock`) rather than the log
/// itself, so lock acquisition never truncates or touches log bytes. The
/// kernel drops an advisory lock with its descriptor, which covers holders
/// that die mid-append.
pub struct SharedLogSink {
    path: PathBuf,
}

impl SharedLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends under the lock. Header and row are decided and written while
    /// the lock is held; the descriptor closing at the end of the scope
    /// releases it.
    fn append_locked(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);

        if needs_header {
            writer.write_record(SHARED_HEADER)?;
        }
        writer.write_record([
            measurement.file.as_str(),
            &measurement.max_rss.to_string(),
            &measurement.time_secs().to_string(),
            measurement.category.as_str(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

impl ResultSink for SharedLogSink {
    fn append(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path(&self.path))?;
        lock.lock_exclusive()?;
        self.append_locked(measurement)
        // lock released when `lock` drops
    }
}

/// Lock file sibling of a log path: the full file name plus `.lock`.
fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
