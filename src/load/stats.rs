//! Load statistics tracking.
//!
//! Tracks what a single load did, separating loaded records from skipped
//! lines so a systematically malformed source stands out even when the load
//! itself succeeds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Statistics for a single load operation.
#[derive(Debug, Clone, Serialize)]
pub struct LoadStats {
    /// Wall-clock start of the load
    pub started_at: DateTime<Utc>,
    /// Raw lines pulled from the input
    pub lines_read: u64,
    /// Records committed to the store
    pub loaded: u64,
    /// Malformed lines that were rejected
    pub skipped: u64,
    /// Blank lines and header rows
    pub ignored: u64,
    /// Index entries written (all indexes together)
    pub entries_written: u64,
    /// Transactions committed
    pub batches_committed: u64,
    /// Time spent in the load call
    pub elapsed: Duration,
}

impl LoadStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            lines_read: 0,
            loaded: 0,
            skipped: 0,
            ignored: 0,
            entries_written: 0,
            batches_committed: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Loaded records per second over the whole load.
    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.loaded as f64 / secs
        } else {
            0.0
        }
    }

    /// `(loaded, skipped)` pair.
    pub fn counts(&self) -> (u64, u64) {
        (self.loaded, self.skipped)
    }
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loaded, {} skipped, {} ignored ({} lines, {} batches, {} entries) in {:.1}s ({:.1} records/s)",
            self.loaded,
            self.skipped,
            self.ignored,
            self.lines_read,
            self.batches_committed,
            self.entries_written,
            self.elapsed.as_secs_f64(),
            self.records_per_second()
        )
    }
}
