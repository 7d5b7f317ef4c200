use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the lookup store. All of them are fatal for a load.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open lookup store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode value for index {index}: {source}")]
    Encode {
        index: String,
        #[source]
        source: bincode::Error,
    },
    #[error("failed to decode value in index {index}: {source}")]
    Decode {
        index: String,
        #[source]
        source: bincode::Error,
    },
}

impl StoreError {
    pub fn encode(index: &str, source: bincode::Error) -> Self {
        StoreError::Encode {
            index: index.to_string(),
            source,
        }
    }

    pub fn decode(index: &str, source: bincode::Error) -> Self {
        StoreError::Decode {
            index: index.to_string(),
            source,
        }
    }
}
