//! Deleted-key tracking.

use chrono::{DateTime, Utc};
use songbook_core::{SongKey, Tombstone};
use std::collections::HashSet;

/// The set of explicitly deleted keys, consulted by every merge.
///
/// Tombstones never expire. The only way to lift one is
/// [`undelete`](Self::undelete), which migration passes never call.
#[derive(Debug, Clone, Default)]
pub struct TombstoneTracker {
    entries: Vec<Tombstone>,
    keys: HashSet<SongKey>,
}

impl TombstoneTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tombstone. Returns `false` (and keeps the original deletion
    /// time) when the key is already tombstoned.
    pub fn record(&mut self, key: SongKey, at: DateTime<Utc>) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key.clone());
        self.entries.push(Tombstone::new(key, at));
        true
    }

    #[must_use]
    pub fn is_tombstoned(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Lift a tombstone. Returns whether one was present.
    pub fn undelete(&mut self, key: &str) -> bool {
        if !self.keys.remove(key) {
            return false;
        }
        self.entries.retain(|t| t.key.as_str() != key);
        true
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Tombstone> {
        self.entries.iter().find(|t| t.key.as_str() == key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tombstone> {
        self.entries.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Tombstone] {
        &self.entries
    }

    #[must_use]
    pub fn into_tombstones(self) -> Vec<Tombstone> {
        self.entries
    }
}

impl From<Vec<Tombstone>> for TombstoneTracker {
    /// Build from stored tombstones; a repeated key keeps its earliest entry.
    fn from(tombstones: Vec<Tombstone>) -> Self {
        let mut tracker = Self::new();
        for tombstone in tombstones {
            match tracker.entries.iter_mut().find(|t| t.key == tombstone.key) {
                Some(existing) if tombstone.deleted_at < existing.deleted_at => {
                    existing.deleted_at = tombstone.deleted_at;
                }
                Some(_) => {}
                None => {
                    tracker.record(tombstone.key, tombstone.deleted_at);
                }
            }
        }
        tracker
    }
}
