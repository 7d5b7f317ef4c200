//! Record readers.
//!
//! Each mapping source has its own line layout. A [`RecordReader`] turns one
//! raw line into at most one [`MappingRecord`]; a malformed line yields a
//! [`Rejection`] instead of an error so that one bad line never stops a
//! multi-gigabyte load.
//!
//! Readers are stateless and `Sync`, which lets the pipelined loader parse a
//! chunk of lines in parallel.

pub mod istex;
pub mod pmc_ids;
pub mod pmid;

pub use istex::IstexJsonReader;
pub use pmc_ids::PmcIdsReader;
pub use pmid::PmidTsvReader;

use crate::models::{MappingRecord, Scheme};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a line did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty primary identifier")]
    EmptyPrimary,
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid {field} value `{value}`")]
    InvalidValue { field: &'static str, value: String },
    #[error("malformed line: {0}")]
    Malformed(String),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("line of {length} bytes exceeds the {limit} byte limit")]
    TooLong { length: u64, limit: usize },
}

impl Rejection {
    pub fn invalid(field: &'static str, value: &str) -> Self {
        Rejection::InvalidValue {
            field,
            value: value.chars().take(64).collect(),
        }
    }
}

/// Outcome of parsing one line.
///
/// `Ok(None)` marks a line that carries no record but is not an error
/// either: blank lines and header rows.
pub type ParseOutcome = Result<Option<MappingRecord>, Rejection>;

/// Parses one mapping source, line by line.
pub trait RecordReader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Scheme of the primary identifier of every record this reader produces.
    fn primary_scheme(&self) -> Scheme;

    /// Parse a single line, without its trailing newline.
    fn parse_line(&self, line: &str) -> ParseOutcome;
}

/// True for an all-ASCII-digit identifier such as a PMID.
pub(crate) fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// The mapping sources known to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    /// Tab-separated `pmid, doi, istex id`.
    Pmid,
    /// NCBI `PMC-ids.csv` export.
    PmcIds,
    /// JSON lines keyed by ISTEX id.
    Istex,
}

impl MappingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MappingSource::Pmid => "pmid",
            MappingSource::PmcIds => "pmc-ids",
            MappingSource::Istex => "istex",
        }
    }

    pub fn primary_scheme(self) -> Scheme {
        match self {
            MappingSource::Pmid | MappingSource::PmcIds => Scheme::Pmid,
            MappingSource::Istex => Scheme::Istex,
        }
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pmid" => Ok(MappingSource::Pmid),
            "pmc-ids" | "pmc_ids" | "pmc" => Ok(MappingSource::PmcIds),
            "istex" => Ok(MappingSource::Istex),
            other => Err(format!(
                "unknown mapping source '{other}'. Use 'pmid', 'pmc-ids' or 'istex'."
            )),
        }
    }
}
