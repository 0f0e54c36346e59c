//! Record of per-item failures.

use crate::errors::HashflowError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One item that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage that dropped the item.
    pub stage: String,
    /// Index of the item within that stage's input.
    pub item: u64,
    /// Error message.
    pub error: String,
    /// Error variant name.
    pub error_kind: String,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a record from an error.
    #[must_use]
    pub fn new(stage: impl Into<String>, item: u64, error: &HashflowError) -> Self {
        Self {
            stage: stage.into(),
            item,
            error: error.to_string(),
            error_kind: error.kind().to_string(),
            at: Utc::now(),
        }
    }
}

/// Thread-safe list of failures for one run.
#[derive(Debug, Default)]
pub struct FailureLog {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn record(&self, record: FailureRecord) {
        self.records.lock().push(record);
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Returns a copy of every record, in the order they were recorded.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.records.lock().clone()
    }
}
