//! Volatile, process-local storage for recent log entries.

pub mod buffer;

pub use buffer::{metadata, LogBuffer, LogEntry, Metadata};
