use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

use crate::model::key::SongKey;
use crate::model::song::SongRecord;

/// An ordered key → record mapping.
///
/// Order is display order: existing records keep their place and new
/// records are appended in the order they were added. No two records
/// share a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongCatalog {
    records: Vec<SongRecord>,
    index: HashMap<SongKey, usize>,
}

impl SongCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced record keeps its position.
    /// Returns the previous record for the key, if any.
    pub fn upsert(&mut self, record: SongRecord) -> Option<SongRecord> {
        if let Some(&pos) = self.index.get(&record.key) {
            Some(std::mem::replace(&mut self.records[pos], record))
        } else {
            self.index.insert(record.key.clone(), self.records.len());
            self.records.push(record);
            None
        }
    }

    /// Remove a record, preserving the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<SongRecord> {
        let pos = self.index.remove(key)?;
        let removed = self.records.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SongRecord> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SongRecord> {
        self.records.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SongKey> {
        self.records.iter().map(|r| &r.key)
    }

    #[must_use]
    pub fn into_records(self) -> Vec<SongRecord> {
        self.records
    }
}

impl FromIterator<SongRecord> for SongCatalog {
    /// Later records replace earlier ones with the same key.
    fn from_iter<I: IntoIterator<Item = SongRecord>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for record in iter {
            catalog.upsert(record);
        }
        catalog
    }
}

impl<'a> IntoIterator for &'a SongCatalog {
    type Item = &'a SongRecord;
    type IntoIter = std::slice::Iter<'a, SongRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Serialize for SongCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SongCatalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<SongRecord>::deserialize(deserializer)?;
        Ok(records.into_iter().collect())
    }
}
