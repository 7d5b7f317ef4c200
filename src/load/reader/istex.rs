use super::{ParseOutcome, RecordReader, Rejection};
use crate::models::{Identifier, MappingRecord, Scheme};
use serde::Deserialize;

/// One line of the ISTEX identifier dump.
#[derive(Debug, Deserialize)]
struct IstexLine {
    #[serde(rename = "istexId", default)]
    istex_id: Option<String>,
    #[serde(default)]
    doi: Vec<String>,
    #[serde(default)]
    ark: Vec<String>,
    #[serde(default)]
    pmid: Vec<String>,
    #[serde(default)]
    pmc: Vec<String>,
}

/// Reader for JSON lines such as
/// `{"istexId":"...","doi":["..."],"ark":["..."],"pmid":["..."]}`.
///
/// Records are keyed by ISTEX id; every listed DOI, ARK, PMID and PMC id
/// becomes a secondary identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct IstexJsonReader;

impl IstexJsonReader {
    pub fn new() -> Self {
        Self
    }
}

impl RecordReader for IstexJsonReader {
    fn name(&self) -> &'static str {
        "istex-json"
    }

    fn primary_scheme(&self) -> Scheme {
        Scheme::Istex
    }

    fn parse_line(&self, line: &str) -> ParseOutcome {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let parsed: IstexLine =
            serde_json::from_str(line).map_err(|err| Rejection::Malformed(err.to_string()))?;

        let istex_id = parsed.istex_id.as_deref().map(str::trim).unwrap_or_default();
        if istex_id.is_empty() {
            return Err(Rejection::EmptyPrimary);
        }

        let mut record = MappingRecord::new(Identifier::new(Scheme::Istex, istex_id));
        for doi in &parsed.doi {
            record = record.with_secondary(Scheme::Doi, doi);
        }
        for ark in &parsed.ark {
            record = record.with_secondary(Scheme::Ark, ark);
        }
        for pmid in &parsed.pmid {
            record = record.with_secondary(Scheme::Pmid, pmid);
        }
        for pmc in &parsed.pmc {
            record = record.with_secondary(Scheme::Pmcid, pmc);
        }

        Ok(Some(record))
    }
}
