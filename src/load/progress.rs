//! Progress reporting and cancellation for loads.
//!
//! The loader never reaches for global state: a [`ProgressSink`] receives
//! the count of records in every committed batch, a [`LoadObserver`] hears
//! about rejected lines and commits, and a [`CancelToken`] lets another
//! thread stop the load between two lines.

use super::reader::Rejection;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Receives one mark per successfully loaded record.
pub trait ProgressSink: Send + Sync {
    /// Called after a commit with the number of records it made durable.
    fn mark(&self, records: u64);
}

/// Sink that discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn mark(&self, _records: u64) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn mark(&self, records: u64) {
        (**self).mark(records);
    }
}

/// Throughput meter that logs count and rate at a fixed interval.
pub struct RateMeter {
    name: String,
    interval: Duration,
    count: AtomicU64,
    started: Instant,
    last_report: Mutex<(Instant, u64)>,
}

impl RateMeter {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            interval,
            count: AtomicU64::new(0),
            started: now,
            last_report: Mutex::new((now, 0)),
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean records per second since the meter was created.
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.count() as f64 / elapsed
        } else {
            0.0
        }
    }

    fn maybe_report(&self, count: u64) {
        let mut last = self.last_report.lock();
        let since = last.0.elapsed();
        if since < self.interval {
            return;
        }

        // a concurrent mark may have reported a higher count already
        let reported = count.max(last.1);
        let window = count.saturating_sub(last.1) as f64 / since.as_secs_f64();
        log::info!(
            "{}: {} records, {:.1}/s over last {}s, {:.1}/s mean",
            self.name,
            count,
            window,
            since.as_secs(),
            self.mean_rate()
        );
        *last = (Instant::now(), reported);
    }
}

impl ProgressSink for RateMeter {
    fn mark(&self, records: u64) {
        let count = self.count.fetch_add(records, Ordering::Relaxed) + records;
        self.maybe_report(count);
    }
}

/// Hooks for per-line and per-batch events.
pub trait LoadObserver: Send + Sync {
    fn record_skipped(&self, _line: u64, _rejection: &Rejection, _skipped_so_far: u64) {}

    fn batch_committed(&self, _batch: u64, _records: usize, _loaded_so_far: u64) {}
}

/// Observer that writes to the log, with a cap on rejection noise.
///
/// The first `detail_limit` rejections are logged individually; after that
/// only one summary line every `summary_every` rejections.
#[derive(Debug, Clone)]
pub struct LogObserver {
    detail_limit: u64,
    summary_every: u64,
}

impl LogObserver {
    pub fn new(detail_limit: u64, summary_every: u64) -> Self {
        Self {
            detail_limit,
            summary_every: summary_every.max(1),
        }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(10, 100_000)
    }
}

impl LoadObserver for LogObserver {
    fn record_skipped(&self, line: u64, rejection: &Rejection, skipped_so_far: u64) {
        if skipped_so_far <= self.detail_limit {
            log::warn!("skipping line {}: {}", line, rejection);
            if skipped_so_far == self.detail_limit {
                log::warn!("further skipped lines will only be summarized");
            }
        } else if skipped_so_far % self.summary_every == 0 {
            log::warn!("{} lines skipped so far (last at line {})", skipped_so_far, line);
        }
    }

    fn batch_committed(&self, batch: u64, records: usize, loaded_so_far: u64) {
        log::debug!(
            "committed batch {} ({} records, {} loaded)",
            batch,
            records,
            loaded_so_far
        );
    }
}

/// Shared flag used to interrupt a running load.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
