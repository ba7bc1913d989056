//! Bounded in-memory log buffer.
//!
//! Holds the most recent log entries written by request handlers. The
//! buffer is volatile and process-local; it is a window for inspection via
//! `GET /logs`, not an audit trail.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DEFAULT_LOG_CAPACITY;

/// Structured metadata attached to a log entry.
pub type Metadata = Map<String, Value>;

/// Level names used by the handlers.
pub const INFO: &str = "INFO";
pub const WARNING: &str = "WARNING";
pub const ERROR: &str = "ERROR";

/// A single log entry. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Fixed-capacity FIFO ring of [`LogEntry`] values.
///
/// Writers are serialized by the lock; readers take a consistent snapshot.
#[derive(Debug)]
pub struct LogBuffer {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an entry stamped with the current UTC time, evicting the
    /// oldest entries once capacity is exceeded.
    ///
    /// A poisoned lock is recovered rather than reported: a failure to log
    /// must never replace the error the caller is trying to record.
    pub fn append(&self, level: &str, message: impl Into<String>, metadata: Option<Metadata>) {
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: level.to_string(),
            message: message.into(),
            metadata,
        };

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn info(&self, message: impl Into<String>, metadata: Option<Metadata>) {
        self.append(INFO, message, metadata);
    }

    pub fn warning(&self, message: impl Into<String>, metadata: Option<Metadata>) {
        self.append(WARNING, message, metadata);
    }

    pub fn error(&self, message: impl Into<String>, metadata: Option<Metadata>) {
        self.append(ERROR, message, metadata);
    }

    /// Return up to `limit` of the most recent entries, oldest first.
    ///
    /// When `level` is given (and non-empty) only entries whose level matches
    /// case-insensitively are considered. Returns an empty Vec if the buffer
    /// cannot be read.
    pub fn query(&self, limit: usize, level: Option<&str>) -> Vec<LogEntry> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "Log buffer unavailable, returning no entries");
                return Vec::new();
            }
        };

        let level = level.filter(|l| !l.is_empty());
        let mut selected: Vec<LogEntry> = entries
            .iter()
            .rev()
            .filter(|e| level.map_or(true, |l| e.level.eq_ignore_ascii_case(l)))
            .take(limit)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }
}

/// Build a metadata map from `(key, value)` pairs.
pub fn metadata<I, K>(pairs: I) -> Metadata
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
