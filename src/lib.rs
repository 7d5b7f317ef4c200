//! Bulk loader for bibliographic identifier mappings.
//!
//! Mapping files (PMID/DOI/ISTEX TSV dumps, the PMC-ids CSV, ISTEX JSON
//! lines) are streamed into a persistent multi-index lookup store so that
//! any known identifier resolves to the record's other identifiers.

pub mod config;
pub mod error;
pub mod load;
pub mod models;
pub mod store;

pub use config::{ConfigError, LookupConfig};
pub use error::LoadError;
pub use load::{BulkLoader, CancelToken, LoadOptions, LoadStats, MappingSource, run_load};
pub use models::{Identifier, LinkedIds, MappingRecord, Scheme};
pub use store::{LookupStore, StoreConfig, StoreError, WriteBatch};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Install the global logger once; later calls are no-ops.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    });
}
