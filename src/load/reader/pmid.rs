use super::{ParseOutcome, RecordReader, Rejection, is_numeric_id};
use crate::models::{Identifier, MappingRecord, Scheme};

const FIELD_COUNT: usize = 3;

/// Reader for tab-separated `pmid \t doi \t istex_id` lines.
///
/// The PMID must be numeric; empty DOI or ISTEX columns are allowed and
/// simply produce no secondary entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PmidTsvReader;

impl PmidTsvReader {
    pub fn new() -> Self {
        Self
    }
}

impl RecordReader for PmidTsvReader {
    fn name(&self) -> &'static str {
        "pmid-tsv"
    }

    fn primary_scheme(&self) -> Scheme {
        Scheme::Pmid
    }

    fn parse_line(&self, line: &str) -> ParseOutcome {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(Rejection::FieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        let pmid = fields[0].trim();
        if pmid.is_empty() {
            return Err(Rejection::EmptyPrimary);
        }
        if !is_numeric_id(pmid) {
            return Err(Rejection::invalid("pmid", pmid));
        }

        let record = MappingRecord::new(Identifier::new(Scheme::Pmid, pmid))
            .with_secondary(Scheme::Doi, fields[1])
            .with_secondary(Scheme::Istex, fields[2]);

        Ok(Some(record))
    }
}
