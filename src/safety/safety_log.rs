//! Fail-safe safety log
//!
//! Append-only record of interlock shutdowns and operator resets. Shares
//! nothing with the audit database: entries go straight to a plain file,
//! flushed and fsynced one by one.
//!
//! File: `<log_dir>/safety_shutdowns_<YYYY-MM-DD>.log`, one file per UTC day.
//! Line: `[YYYY-MM-DD HH:MM:SS] [LEVEL] message`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::types::Metric;

#[derive(Debug, thiserror::Error)]
pub enum SafetyLogError {
    #[error("safety log I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("safety log lock poisoned")]
    Poisoned,
    #[error("safety log unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    Info,
    Critical,
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyLevel::Info => write!(f, "INFO"),
            SafetyLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: SafetyLevel,
    pub message: String,
}

impl SafetyLogEntry {
    /// Hard interlock activation.
    pub fn shutdown(tool_id: &str, wafer_id: &str, metric: Metric, value: f64, limit: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            level: SafetyLevel::Critical,
            message: format!(
                "SHUTDOWN TRIGGERED | Tool: {} | Wafer: {} | Metric: {} | Value: {:.2} > Limit: {:?}",
                tool_id,
                wafer_id,
                metric.as_str(),
                value,
                limit
            ),
        }
    }

    /// Operator clearing of the quarantine set.
    pub fn reset(records_cleared: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            level: SafetyLevel::Info,
            message: format!(
                "SYSTEM RESET | Action: Manual Override | State: Cleared | Records: {}",
                records_cleared
            ),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Durable destination for safety entries.
pub trait SafetyLogSink: Send + Sync {
    /// Append one entry; returns only once the entry is durable
    fn append(&self, entry: &SafetyLogEntry) -> Result<(), SafetyLogError>;

    /// Human-readable location, for startup logging
    fn describe(&self) -> String;
}

// ============================================================================
// File sink
// ============================================================================

struct DailyFile {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

/// Daily-rotated append-only log file.
pub struct FileSafetyLog {
    dir: PathBuf,
    current: Mutex<Option<DailyFile>>,
}

impl FileSafetyLog {
    /// Create the log directory and open today's file.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SafetyLogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| SafetyLogError::Io {
            path: dir.clone(),
            source,
        })?;

        let today = Self::open_day(&dir, Utc::now().date_naive())?;
        Ok(Self {
            dir,
            current: Mutex::new(Some(today)),
        })
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("safety_shutdowns_{}.log", date.format("%Y-%m-%d"))
    }

    /// Path of the file entries for `date` go to.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name(date))
    }

    fn open_day(dir: &Path, date: NaiveDate) -> Result<DailyFile, SafetyLogError> {
        let path = dir.join(Self::file_name(date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SafetyLogError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(DailyFile { date, path, file })
    }
}

impl SafetyLogSink for FileSafetyLog {
    fn append(&self, entry: &SafetyLogEntry) -> Result<(), SafetyLogError> {
        let mut current = self.current.lock().map_err(|_| SafetyLogError::Poisoned)?;

        let date = entry.timestamp.date_naive();
        let daily = match current.take() {
            Some(daily) if daily.date == date => daily,
            _ => Self::open_day(&self.dir, date)?,
        };
        let daily = current.insert(daily);

        let path = daily.path.clone();
        let io_err = |source| SafetyLogError::Io {
            path: path.clone(),
            source,
        };
        writeln!(daily.file, "{}", entry.to_line()).map_err(io_err)?;
        daily.file.flush().map_err(io_err)?;
        daily.file.sync_all().map_err(io_err)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

// ============================================================================
// Memory sink
// ============================================================================

/// In-memory sink for tests; `set_failing(true)` makes appends fail.
#[derive(Default)]
pub struct MemorySafetyLog {
    entries: Mutex<Vec<SafetyLogEntry>>,
    failing: AtomicBool,
}

impl MemorySafetyLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<SafetyLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SafetyLogSink for MemorySafetyLog {
    fn append(&self, entry: &SafetyLogEntry) -> Result<(), SafetyLogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SafetyLogError::Unavailable("disk full".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| SafetyLogError::Poisoned)?
            .push(entry.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
