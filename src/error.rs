use crate::load::LoadStats;
use crate::load::stream::StreamError;
use crate::store::StoreError;
use std::io;
use thiserror::Error;

/// Fatal errors of a load. Per-line problems never end up here.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid load options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("failed to read input at line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("load cancelled after {} committed records", .stats.loaded)]
    Cancelled { stats: Box<LoadStats> },
    #[error("load worker failed: {0}")]
    Worker(String),
}

impl LoadError {
    /// Stage of the pipeline that failed, for operator diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            LoadError::InvalidOptions(_) => "configuration",
            LoadError::Stream(StreamError::Open { .. }) => "open input",
            LoadError::Stream(StreamError::Decompression { .. }) => "decompress input",
            LoadError::Read { .. } => "read input",
            LoadError::Store(StoreError::Open { .. }) => "open store",
            LoadError::Store(_) => "commit batch",
            LoadError::Cancelled { .. } => "cancelled",
            LoadError::Worker(_) => "parse worker",
        }
    }

    /// Statistics of the committed batches when the load was interrupted.
    pub fn cancelled_stats(&self) -> Option<&LoadStats> {
        match self {
            LoadError::Cancelled { stats } => Some(stats.as_ref()),
            _ => None,
        }
    }
}
