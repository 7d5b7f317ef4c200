//! Fan-out of parsed records into index entries.
//!
//! Every record yields one entry in the primary index plus one entry per
//! secondary identifier. All of them are staged into the same
//! [`WriteBatch`], so they are committed together or not at all.

use crate::models::{MappingRecord, Scheme};
use crate::store::{StoreError, WriteBatch};

/// Index names for records keyed by one primary scheme.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    primary_scheme: Scheme,
    primary_index: String,
    secondary_indexes: Vec<(Scheme, String)>,
}

impl IndexLayout {
    pub fn new(primary_scheme: Scheme) -> Self {
        let secondary_indexes = Scheme::ALL
            .iter()
            .map(|scheme| (*scheme, scheme.secondary_index(primary_scheme)))
            .collect();

        Self {
            primary_scheme,
            primary_index: primary_scheme.primary_index(),
            secondary_indexes,
        }
    }

    pub fn primary_scheme(&self) -> Scheme {
        self.primary_scheme
    }

    /// Name of the `*_to_ids` index.
    pub fn primary_index(&self) -> &str {
        &self.primary_index
    }

    /// Name of the `{scheme}_to_{primary}` index.
    pub fn secondary_index(&self, scheme: Scheme) -> &str {
        self.secondary_indexes
            .iter()
            .find(|(candidate, _)| *candidate == scheme)
            .map(|(_, name)| name.as_str())
            .unwrap_or_default()
    }
}

/// One key/value write derived from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: String,
    pub key: String,
    pub value: Vec<u8>,
}

/// Compute every index entry a record produces, primary entry first.
pub fn build_index_entries(
    layout: &IndexLayout,
    record: &MappingRecord,
) -> Result<Vec<IndexEntry>, StoreError> {
    let primary_key = record.primary.scheme.index_key(&record.primary.value);
    let linked = record
        .linked_ids()
        .encode()
        .map_err(|err| StoreError::encode(layout.primary_index(), err))?;

    let mut entries = Vec::with_capacity(record.secondary.len() + 1);
    entries.push(IndexEntry {
        index: layout.primary_index().to_string(),
        key: primary_key.clone(),
        value: linked,
    });

    for id in &record.secondary {
        entries.push(IndexEntry {
            index: layout.secondary_index(id.scheme).to_string(),
            key: id.scheme.index_key(&id.value),
            value: primary_key.as_bytes().to_vec(),
        });
    }

    Ok(entries)
}

/// Stage all entries of `record` into `batch`; returns the number of puts.
pub fn stage_record(
    batch: &mut WriteBatch,
    layout: &IndexLayout,
    record: &MappingRecord,
) -> Result<usize, StoreError> {
    let entries = build_index_entries(layout, record)?;
    for entry in &entries {
        batch.put(&entry.index, entry.key.as_bytes(), &entry.value);
    }
    Ok(entries.len())
}
