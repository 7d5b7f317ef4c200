//! Bulk import of identifier mapping files.
//!
//! A load resolves the input (plain or gzip), parses it line by line with a
//! [`RecordReader`], and writes every record into the lookup store in
//! batched transactions. See [`loader`] for the batching and cancellation
//! rules.

pub mod entries;
pub mod loader;
pub mod progress;
pub mod reader;
pub mod stats;
pub mod stream;

pub use entries::{IndexEntry, IndexLayout, build_index_entries};
pub use loader::{BulkLoader, LoadMode, LoadOptions};
pub use progress::{CancelToken, LoadObserver, LogObserver, NoopProgress, ProgressSink, RateMeter};
pub use reader::{
    IstexJsonReader, MappingSource, PmcIdsReader, PmidTsvReader, RecordReader, Rejection,
};
pub use stats::LoadStats;
pub use stream::{Compression, InputStream, StreamError, open_input};

use crate::config::LookupConfig;
use crate::error::LoadError;
use crate::store::LookupStore;
use std::path::Path;
use std::sync::Arc;

/// Load `path` into the store described by `config` using the reader of
/// `source`.
///
/// Progress is logged every `config.report_interval`; `cancel` stops the
/// load before the next line or commit.
pub fn run_load(
    config: &LookupConfig,
    source: MappingSource,
    path: &Path,
    cancel: CancelToken,
) -> Result<LoadStats, LoadError> {
    let options = config.load_options();
    options.validate()?;

    let store = LookupStore::open_with(&config.store_config())?;
    let meter = Arc::new(RateMeter::new(source.as_str(), config.report_interval));
    let loader = BulkLoader::new(&store, options)
        .with_progress(meter.clone())
        .with_observer(LogObserver::new(config.skip_log_limit, 100_000))
        .with_cancel(cancel);

    let stats = match source {
        MappingSource::Pmid => loader.load_path(path, &PmidTsvReader::new())?,
        MappingSource::PmcIds => loader.load_path(path, &PmcIdsReader::new())?,
        MappingSource::Istex => loader.load_path(path, &IstexJsonReader::new())?,
    };

    log::info!(
        "{} store at {} now holds {} primary entries ({:.1} records/s overall)",
        source,
        store.path().display(),
        store.size(&source.primary_scheme().primary_index())?,
        meter.mean_rate()
    );

    Ok(stats)
}
