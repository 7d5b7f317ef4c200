//! Bulk loading of mapping files into the lookup store.
//!
//! The [`BulkLoader`] drives the whole ingest:
//! 1. Pull raw lines from the decoded input
//! 2. Parse each line with the selected [`RecordReader`]
//! 3. Stage every index entry of a record into the current batch
//! 4. Commit the batch once `batch_size` records are staged
//! 5. Commit the trailing partial batch at end of input
//!
//! Malformed lines are counted and reported to the observer, never
//! propagated. Storage and read failures stop the load at once; the batch in
//! flight is dropped and every previously committed batch stays durable.

use super::entries::{IndexLayout, stage_record};
use super::progress::{CancelToken, LoadObserver, LogObserver, NoopProgress, ProgressSink};
use super::reader::{ParseOutcome, RecordReader, Rejection};
use super::stats::LoadStats;
use super::stream::open_input;
use crate::error::LoadError;
use crate::store::{LookupStore, WriteBatch};
use chrono::Utc;
use rayon::prelude::*;
use std::io::{BufRead, Read};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::time::Instant;

/// Records per transaction unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Longest accepted line in bytes, terminator excluded. Longer lines are
/// skipped without being buffered.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// How reading/parsing and writing are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Read, parse, stage and commit on the calling thread.
    Sequential,
    /// Read and parse on a producer thread, hand chunks to the writer through
    /// a bounded queue of `queue_depth` chunks.
    Pipelined {
        queue_depth: usize,
        parse_threads: usize,
    },
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub mode: LoadMode,
    pub max_line_bytes: usize,
}

impl LoadOptions {
    pub fn sequential(batch_size: usize) -> Self {
        Self {
            batch_size,
            mode: LoadMode::Sequential,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn pipelined(batch_size: usize, queue_depth: usize, parse_threads: usize) -> Self {
        Self {
            batch_size,
            mode: LoadMode::Pipelined {
                queue_depth,
                parse_threads,
            },
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.batch_size == 0 {
            return Err(LoadError::InvalidOptions(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(LoadError::InvalidOptions(
                "max line length must be at least 1 byte".to_string(),
            ));
        }
        if let LoadMode::Pipelined {
            queue_depth,
            parse_threads,
        } = self.mode
        {
            if queue_depth == 0 {
                return Err(LoadError::InvalidOptions(
                    "queue depth must be at least 1".to_string(),
                ));
            }
            if parse_threads == 0 {
                return Err(LoadError::InvalidOptions(
                    "parse threads must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::sequential(DEFAULT_BATCH_SIZE)
    }
}

/// Loads a mapping source into a [`LookupStore`].
///
/// The loader is the store's only writer for the duration of a load.
pub struct BulkLoader<'s> {
    store: &'s LookupStore,
    options: LoadOptions,
    progress: Box<dyn ProgressSink>,
    observer: Box<dyn LoadObserver>,
    cancel: CancelToken,
}

impl<'s> BulkLoader<'s> {
    pub fn new(store: &'s LookupStore, options: LoadOptions) -> Self {
        Self {
            store,
            options,
            progress: Box::new(NoopProgress),
            observer: Box::new(LogObserver::default()),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_observer(mut self, observer: impl LoadObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts this loader when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Open `path` (decoding gzip when needed) and load it.
    pub fn load_path<R: RecordReader>(
        &self,
        path: impl AsRef<Path>,
        reader: &R,
    ) -> Result<LoadStats, LoadError> {
        let input = open_input(path.as_ref())?;
        log::info!(
            "loading {} mapping keyed by {} from {} ({:?})",
            reader.name(),
            reader.primary_scheme(),
            path.as_ref().display(),
            input.compression()
        );
        self.load(input, reader)
    }

    /// Load every line of `input` through `reader`.
    ///
    /// Returns the statistics of the load; `loaded` and `skipped` are the
    /// record and rejected-line counts.
    pub fn load<B, R>(&self, input: B, reader: &R) -> Result<LoadStats, LoadError>
    where
        B: BufRead + Send,
        R: RecordReader,
    {
        self.options.validate()?;

        let mut session = LoadSession {
            store: self.store,
            layout: IndexLayout::new(reader.primary_scheme()),
            batch_size: self.options.batch_size,
            max_line_bytes: self.options.max_line_bytes,
            progress: self.progress.as_ref(),
            observer: self.observer.as_ref(),
            cancel: &self.cancel,
            batch: self.store.begin_batch(),
            staged: 0,
            stats: LoadStats::new(Utc::now()),
            started: Instant::now(),
        };

        log::debug!(
            "starting {} load: batch size {}, mode {:?}",
            reader.name(),
            self.options.batch_size,
            self.options.mode
        );

        match self.options.mode {
            LoadMode::Sequential => load_sequential(input, reader, &mut session)?,
            LoadMode::Pipelined {
                queue_depth,
                parse_threads,
            } => load_pipelined(input, reader, &mut session, queue_depth, parse_threads)?,
        }

        let stats = session.finish()?;
        log::info!("{} load finished: {}", reader.name(), stats);
        Ok(stats)
    }
}

/// Transient state of one load call.
struct LoadSession<'a> {
    store: &'a LookupStore,
    layout: IndexLayout,
    batch_size: usize,
    max_line_bytes: usize,
    progress: &'a dyn ProgressSink,
    observer: &'a dyn LoadObserver,
    cancel: &'a CancelToken,
    batch: WriteBatch,
    staged: usize,
    stats: LoadStats,
    started: Instant,
}

impl LoadSession<'_> {
    fn accept(&mut self, line_no: u64, outcome: ParseOutcome) -> Result<(), LoadError> {
        self.stats.lines_read += 1;

        match outcome {
            Ok(Some(record)) => {
                stage_record(&mut self.batch, &self.layout, &record)?;
                self.staged += 1;
                if self.staged >= self.batch_size {
                    self.commit()?;
                }
            }
            Ok(None) => self.stats.ignored += 1,
            Err(rejection) => {
                self.stats.skipped += 1;
                self.observer
                    .record_skipped(line_no, &rejection, self.stats.skipped);
            }
        }

        Ok(())
    }

    fn check_cancelled(&mut self) -> Result<(), LoadError> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }

        if self.staged > 0 {
            log::warn!(
                "load cancelled, discarding {} uncommitted records",
                self.staged
            );
        }
        self.batch = WriteBatch::default();
        self.staged = 0;

        Err(LoadError::Cancelled {
            stats: Box::new(self.snapshot()),
        })
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        self.check_cancelled()?;

        let batch = std::mem::take(&mut self.batch);
        let records = std::mem::replace(&mut self.staged, 0);
        let summary = self.store.commit(batch)?;

        self.stats.entries_written += summary.puts as u64;
        if records > 0 {
            self.stats.loaded += records as u64;
            self.stats.batches_committed += 1;
            self.progress.mark(records as u64);
            self.observer.batch_committed(
                self.stats.batches_committed,
                records,
                self.stats.loaded,
            );
        }

        Ok(())
    }

    fn snapshot(&self) -> LoadStats {
        let mut stats = self.stats.clone();
        stats.elapsed = self.started.elapsed();
        stats
    }

    fn finish(mut self) -> Result<LoadStats, LoadError> {
        self.commit()?;
        Ok(self.snapshot())
    }
}

/// What [`read_raw_line`] found.
enum RawLine {
    /// A line is in the buffer, terminator stripped.
    Line,
    /// The line exceeded the limit and was discarded.
    TooLong { length: u64 },
    End,
}

/// Read one raw line into `buf` without its line terminator.
///
/// At most `max_line_bytes + 1` bytes are buffered; the remainder of a longer
/// line is consumed and dropped.
fn read_raw_line<B: BufRead>(
    input: &mut B,
    buf: &mut Vec<u8>,
    line_no: u64,
    max_line_bytes: usize,
) -> Result<RawLine, LoadError> {
    let read_error = |source: std::io::Error| LoadError::Read {
        line: line_no,
        source,
    };

    buf.clear();
    let read = (&mut *input)
        .take((max_line_bytes as u64).saturating_add(1))
        .read_until(b'\n', buf)
        .map_err(read_error)?;

    if read == 0 {
        return Ok(RawLine::End);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(RawLine::Line);
    }
    if read > max_line_bytes {
        let crlf_at_limit = buf.last() == Some(&b'\r')
            && input.fill_buf().map_err(read_error)?.first() == Some(&b'\n');
        if crlf_at_limit {
            input.consume(1);
            buf.pop();
            return Ok(RawLine::Line);
        }
        let rest = input.skip_until(b'\n').map_err(read_error)?;
        buf.clear();
        return Ok(RawLine::TooLong {
            length: (read + rest) as u64,
        });
    }
    Ok(RawLine::Line)
}

fn parse_raw_line<R: RecordReader>(reader: &R, raw: &[u8], line_no: u64) -> ParseOutcome {
    let line = std::str::from_utf8(raw).map_err(|_| Rejection::InvalidUtf8)?;
    let line = if line_no == 1 {
        line.strip_prefix('\u{feff}').unwrap_or(line)
    } else {
        line
    };
    reader.parse_line(line)
}

fn load_sequential<B: BufRead, R: RecordReader>(
    mut input: B,
    reader: &R,
    session: &mut LoadSession<'_>,
) -> Result<(), LoadError> {
    let mut buf = Vec::with_capacity(256);
    let mut line_no = 0u64;
    let limit = session.max_line_bytes;

    loop {
        session.check_cancelled()?;
        let outcome = match read_raw_line(&mut input, &mut buf, line_no + 1, limit)? {
            RawLine::End => break,
            RawLine::Line => parse_raw_line(reader, &buf, line_no + 1),
            RawLine::TooLong { length } => Err(Rejection::TooLong { length, limit }),
        };
        line_no += 1;
        session.accept(line_no, outcome)?;
    }

    Ok(())
}

/// Parsed lines handed from the producer to the writer, in input order.
type ParsedChunk = Vec<(u64, ParseOutcome)>;

fn load_pipelined<B, R>(
    input: B,
    reader: &R,
    session: &mut LoadSession<'_>,
    queue_depth: usize,
    parse_threads: usize,
) -> Result<(), LoadError>
where
    B: BufRead + Send,
    R: RecordReader,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parse_threads)
        .build()
        .map_err(|err| LoadError::Worker(format!("failed to create parse pool: {err}")))?;
    let chunk_lines = session.batch_size;
    let max_line_bytes = session.max_line_bytes;
    let cancel = session.cancel.clone();

    log::debug!(
        "pipelined load: {} parse threads, queue depth {}",
        parse_threads,
        queue_depth
    );

    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel::<Result<ParsedChunk, LoadError>>(queue_depth);
        let pool = &pool;
        let producer = scope.spawn(move || {
            produce_chunks(input, reader, pool, chunk_lines, max_line_bytes, &cancel, tx)
        });

        let consumed = consume_chunks(rx, session);
        let produced = producer.join();

        consumed?;
        produced.map_err(|_| LoadError::Worker("parse thread panicked".to_string()))
    })
}

fn produce_chunks<B: BufRead, R: RecordReader>(
    mut input: B,
    reader: &R,
    pool: &rayon::ThreadPool,
    chunk_lines: usize,
    max_line_bytes: usize,
    cancel: &CancelToken,
    tx: SyncSender<Result<ParsedChunk, LoadError>>,
) {
    let mut line_no = 0u64;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut raw_lines: Vec<(u64, Result<Vec<u8>, Rejection>)> =
            Vec::with_capacity(chunk_lines);
        let mut failure = None;
        while raw_lines.len() < chunk_lines {
            let mut buf = Vec::new();
            let raw = match read_raw_line(&mut input, &mut buf, line_no + 1, max_line_bytes) {
                Ok(RawLine::End) => break,
                Ok(RawLine::Line) => Ok(buf),
                Ok(RawLine::TooLong { length }) => Err(Rejection::TooLong {
                    length,
                    limit: max_line_bytes,
                }),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            line_no += 1;
            raw_lines.push((line_no, raw));
        }

        let exhausted = raw_lines.len() < chunk_lines;
        if !raw_lines.is_empty() {
            let chunk: ParsedChunk = pool.install(|| {
                raw_lines
                    .into_par_iter()
                    .map(|(line, raw)| {
                        let outcome = raw.and_then(|bytes| parse_raw_line(reader, &bytes, line));
                        (line, outcome)
                    })
                    .collect()
            });
            if tx.send(Ok(chunk)).is_err() {
                // writer stopped; its error is reported from the other side
                return;
            }
        }

        if let Some(err) = failure {
            let _ = tx.send(Err(err));
            return;
        }
        if exhausted {
            return;
        }
    }
}

fn consume_chunks(
    rx: Receiver<Result<ParsedChunk, LoadError>>,
    session: &mut LoadSession<'_>,
) -> Result<(), LoadError> {
    for message in rx {
        for (line_no, outcome) in message? {
            session.check_cancelled()?;
            session.accept(line_no, outcome)?;
        }
    }
    session.check_cancelled()
}
