use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{SongCatalog, Tombstone};

/// An immutable view of a store's contents at one instant.
///
/// Passes read a snapshot once, merge against it by reference, and hand
/// it to the backup step unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    taken_at: DateTime<Utc>,
    songs: SongCatalog,
    #[serde(default)]
    tombstones: Vec<Tombstone>,
}

impl StoreSnapshot {
    #[must_use]
    pub fn new(songs: SongCatalog, tombstones: Vec<Tombstone>, taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            songs,
            tombstones,
        }
    }

    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    #[must_use]
    pub const fn songs(&self) -> &SongCatalog {
        &self.songs
    }

    #[must_use]
    pub fn tombstones(&self) -> &[Tombstone] {
        &self.tombstones
    }

    #[must_use]
    pub fn into_parts(self) -> (SongCatalog, Vec<Tombstone>) {
        (self.songs, self.tombstones)
    }
}
