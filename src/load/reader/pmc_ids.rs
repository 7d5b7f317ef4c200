use super::{ParseOutcome, RecordReader, Rejection, is_numeric_id};
use crate::models::{Identifier, MappingRecord, Scheme};

/// Column positions in the NCBI `PMC-ids.csv` export:
/// `Journal Title,ISSN,eISSN,Year,Volume,Issue,Page,DOI,PMCID,PMID,Manuscript Id,Release Date`
const DOI_COLUMN: usize = 7;
const PMCID_COLUMN: usize = 8;
const PMID_COLUMN: usize = 9;
const MIN_FIELDS: usize = PMID_COLUMN + 1;

const HEADER_PREFIX: &str = "Journal Title,";

/// Reader for the NCBI PMC id mapping file.
///
/// Rows without a PMID (frequent in this export) are rejected as
/// [`Rejection::EmptyPrimary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PmcIdsReader;

impl PmcIdsReader {
    pub fn new() -> Self {
        Self
    }
}

impl RecordReader for PmcIdsReader {
    fn name(&self) -> &'static str {
        "pmc-ids-csv"
    }

    fn primary_scheme(&self) -> Scheme {
        Scheme::Pmid
    }

    fn parse_line(&self, line: &str) -> ParseOutcome {
        if line.trim().is_empty() || line.starts_with(HEADER_PREFIX) {
            return Ok(None);
        }

        let fields = split_csv_line(line)?;
        if fields.len() < MIN_FIELDS {
            return Err(Rejection::FieldCount {
                expected: MIN_FIELDS,
                found: fields.len(),
            });
        }

        let pmid = fields[PMID_COLUMN].trim();
        if pmid.is_empty() {
            return Err(Rejection::EmptyPrimary);
        }
        if !is_numeric_id(pmid) {
            return Err(Rejection::invalid("pmid", pmid));
        }

        let record = MappingRecord::new(Identifier::new(Scheme::Pmid, pmid))
            .with_secondary(Scheme::Doi, &fields[DOI_COLUMN])
            .with_secondary(Scheme::Pmcid, &fields[PMCID_COLUMN]);

        Ok(Some(record))
    }
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Result<Vec<String>, Rejection> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (other, _) => current.push(other),
        }
    }

    if in_quotes {
        return Err(Rejection::Malformed("unterminated quoted field".to_string()));
    }

    fields.push(current);
    Ok(fields)
}
