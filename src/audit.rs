//! Audit log of emitted events
//!
//! Every emission task appends one [`AuditRecord`] to the shared
//! [`AuditLogBuffer`]. The buffer is written to an [`AuditLogFile`] once,
//! at shutdown.
//!
//! ## File format
//!
//! Semicolon-separated text with a header written when the file is created:
//!
//! ```text
//! timestamp;delay;type;value;code
//! 1700000000123;50;1;1;30
//! ```

use crate::device::{EventClass, RawInputEvent};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Header line of a new audit log file
pub const HEADER: &str = "timestamp;delay;type;value;code";

/// Capacity the buffer starts with and returns to after a flush
pub const INITIAL_CAPACITY: usize = 10;

/// One emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRecord {
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Delay applied before emission
    pub delay_ms: u32,
    pub class: EventClass,
    /// Kernel event type
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl AuditRecord {
    pub fn new(event: &RawInputEvent, delay_ms: u32) -> Self {
        Self {
            timestamp_ms: event.timestamp_ms,
            delay_ms,
            class: event.class(),
            event_type: event.event_type,
            code: event.code,
            value: event.value,
        }
    }

    /// Format as a log line (without newline)
    pub fn to_line(&self) -> String {
        format!(
            "{};{};{};{};{}",
            self.timestamp_ms, self.delay_ms, self.event_type, self.value, self.code
        )
    }
}

/// Append-only record buffer shared by all emission tasks
#[derive(Debug)]
pub struct AuditLogBuffer {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLogBuffer {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    /// Append a record; appends from concurrent tasks are serialized
    pub fn append(&self, record: AuditRecord) {
        self.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of all records in append order
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.lock().clone()
    }

    /// Write every record to `file` in append order, then empty the buffer.
    ///
    /// Records stay buffered if writing fails. Returns the number written.
    pub fn flush_and_clear(&self, file: &AuditLogFile) -> io::Result<usize> {
        let mut records = self.lock();
        file.append(&records)?;

        let written = records.len();
        *records = Vec::with_capacity(INITIAL_CAPACITY);
        Ok(written)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AuditLogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Semicolon-separated audit log on disk
#[derive(Debug, Clone)]
pub struct AuditLogFile {
    path: PathBuf,
}

impl AuditLogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records`, writing the header first if the file is new
    pub fn append(&self, records: &[AuditRecord]) -> io::Result<()> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);

        if is_new {
            writeln!(out, "{}", HEADER)?;
        }
        for record in records {
            writeln!(out, "{}", record.to_line())?;
        }
        out.flush()
    }
}
