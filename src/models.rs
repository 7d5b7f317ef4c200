use serde::{Deserialize, Serialize};
use std::fmt;

// ===== Identifier Schemes =====

/// Bibliographic identifier schemes cross-referenced by the lookup store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Pmid,
    Pmcid,
    Doi,
    Ark,
    Istex,
}

impl Scheme {
    pub const ALL: [Scheme; 5] = [
        Scheme::Pmid,
        Scheme::Pmcid,
        Scheme::Doi,
        Scheme::Ark,
        Scheme::Istex,
    ];

    /// Stable lowercase name, used to derive index names.
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Pmid => "pmid",
            Scheme::Pmcid => "pmcid",
            Scheme::Doi => "doi",
            Scheme::Ark => "ark",
            Scheme::Istex => "istex",
        }
    }

    /// Name of the index holding `primary value -> LinkedIds` for records keyed by this scheme.
    pub fn primary_index(self) -> String {
        format!("{}_to_ids", self.as_str())
    }

    /// Name of the index holding `self value -> primary value`.
    pub fn secondary_index(self, primary: Scheme) -> String {
        format!("{}_to_{}", self.as_str(), primary.as_str())
    }

    /// Normalize a value before it is used as an index key.
    ///
    /// DOIs are case-insensitive, so their keys are lowercased.
    pub fn index_key(self, value: &str) -> String {
        match self {
            Scheme::Doi => value.trim().to_lowercase(),
            _ => value.trim().to_string(),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===== Parsed Records =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub scheme: Scheme,
    pub value: String,
}

impl Identifier {
    pub fn new(scheme: Scheme, value: impl Into<String>) -> Self {
        Self {
            scheme,
            value: value.into(),
        }
    }
}

/// One parsed input line: a primary identifier plus the identifiers it maps to.
///
/// Built by a record reader from a single line and consumed by the loader in
/// the same iteration. The primary value is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    pub primary: Identifier,
    pub secondary: Vec<Identifier>,
}

impl MappingRecord {
    pub fn new(primary: Identifier) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
        }
    }

    /// Attach a secondary identifier, ignoring blank values.
    pub fn with_secondary(mut self, scheme: Scheme, value: &str) -> Self {
        let value = value.trim();
        if !value.is_empty() {
            self.secondary.push(Identifier::new(scheme, value));
        }
        self
    }

    /// Value stored in the primary index for this record.
    pub fn linked_ids(&self) -> LinkedIds {
        let mut linked = LinkedIds::default();
        for id in &self.secondary {
            linked.set_if_absent(id.scheme, &id.value);
        }
        linked
    }
}

// ===== Stored Values =====

/// Identifiers linked to a primary key, as stored in a `*_to_ids` index.
///
/// Holds one value per scheme; when a record carries several identifiers of
/// the same scheme the first one is kept here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIds {
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
    pub ark: Option<String>,
    pub istex_id: Option<String>,
}

impl LinkedIds {
    fn set_if_absent(&mut self, scheme: Scheme, value: &str) {
        let slot = self.slot_mut(scheme);
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    fn slot_mut(&mut self, scheme: Scheme) -> &mut Option<String> {
        match scheme {
            Scheme::Pmid => &mut self.pmid,
            Scheme::Pmcid => &mut self.pmcid,
            Scheme::Doi => &mut self.doi,
            Scheme::Ark => &mut self.ark,
            Scheme::Istex => &mut self.istex_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_names() {
        assert_eq!(Scheme::Pmid.primary_index(), "pmid_to_ids");
        assert_eq!(Scheme::Doi.secondary_index(Scheme::Pmid), "doi_to_pmid");
        assert_eq!(Scheme::Istex.secondary_index(Scheme::Pmid), "istex_to_pmid");
        assert_eq!(Scheme::Ark.secondary_index(Scheme::Istex), "ark_to_istex");
    }

    #[test]
    fn test_doi_keys_are_lowercased() {
        assert_eq!(Scheme::Doi.index_key(" 10.1000/ABC "), "10.1000/abc");
        assert_eq!(Scheme::Istex.index_key("ISTEX-0001"), "ISTEX-0001");
    }

    #[test]
    fn test_linked_ids_keep_first_value_per_scheme() {
        let record = MappingRecord::new(Identifier::new(Scheme::Istex, "ISTEX-1"))
            .with_secondary(Scheme::Doi, "10.1/a")
            .with_secondary(Scheme::Doi, "10.1/b")
            .with_secondary(Scheme::Ark, "  ")
            .with_secondary(Scheme::Pmid, "42");

        let linked = record.linked_ids();
        assert_eq!(linked.doi.as_deref(), Some("10.1/a"));
        assert_eq!(linked.pmid.as_deref(), Some("42"));
        assert_eq!(linked.ark, None);
        assert_eq!(record.secondary.len(), 3);
    }

    #[test]
    fn test_linked_ids_encoding() {
        let linked = LinkedIds {
            doi: Some("10.1000/xyz".to_string()),
            istex_id: Some("ISTEX-0001".to_string()),
            ..Default::default()
        };
        let bytes = linked.encode().unwrap();
        assert_eq!(LinkedIds::decode(&bytes).unwrap(), linked);
    }
}
