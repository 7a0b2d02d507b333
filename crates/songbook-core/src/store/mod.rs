//! Durable storage behind a narrow read/write contract.
//!
//! The migration engine never touches a store's internals; it reads a
//! snapshot, asks for a backup, and writes a whole catalog back. Two
//! adapters ship with the crate: [`SqliteStore`] and [`JsonFileStore`].

pub mod hold;
pub mod json;
pub mod migrations;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::model::{SongCatalog, SongField, SongKey, Tombstone};
use crate::provenance::FieldOverride;
use crate::snapshot::StoreSnapshot;

pub use hold::StoreHold;
pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

/// Where a backup was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupLocation {
    /// Identifier accepted by [`StorageAdapter::read_backup`].
    pub id: String,
    /// Human-readable location (a file path or a table reference).
    pub location: String,
}

impl fmt::Display for BackupLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.location)
    }
}

/// Summary of one stored backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub location: BackupLocation,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
}

/// The contract between the engine and a persisted store.
///
/// Implementations own the durable song and tombstone collections between
/// passes. Writes replace the whole collection; there are no partial
/// record updates outside [`delete_field`](Self::delete_field).
pub trait StorageAdapter: fmt::Debug {
    /// Short description for logs ("sqlite:/path/to/db").
    fn describe(&self) -> String;

    /// Take the exclusive advisory hold for one pass. The hold is released
    /// when the returned guard drops.
    fn hold(&self) -> Result<StoreHold>;

    fn read_all(&self) -> Result<SongCatalog>;

    fn read_tombstones(&self) -> Result<Vec<Tombstone>>;

    /// Legacy per-field values stored outside the song documents.
    fn read_field_overrides(&self) -> Result<Vec<FieldOverride>>;

    fn write_all(&mut self, songs: &SongCatalog) -> Result<()>;

    fn write_tombstones(&mut self, tombstones: &[Tombstone]) -> Result<()>;

    /// Persist a full snapshot so it can be read back later.
    fn backup(&mut self, snapshot: &StoreSnapshot, label: &str) -> Result<BackupLocation>;

    /// Backups, oldest first.
    fn list_backups(&self) -> Result<Vec<BackupInfo>>;

    fn read_backup(&self, id: &str) -> Result<StoreSnapshot>;

    /// Remove one legacy per-field override. Missing overrides are not an error.
    fn delete_field(&mut self, key: &SongKey, field: SongField) -> Result<()>;

    /// Read songs and tombstones as one snapshot.
    fn snapshot(&self, taken_at: DateTime<Utc>) -> Result<StoreSnapshot> {
        let songs = self.read_all()?;
        let tombstones = self.read_tombstones()?;
        Ok(StoreSnapshot::new(songs, tombstones, taken_at))
    }
}

/// Build a backup identifier from a label: keeps `[A-Za-z0-9._-]`, then a
/// short random suffix so repeated labels never collide.
pub(crate) fn backup_id(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", safe.trim_matches('-'), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_id_is_filesystem_safe() {
        let id = backup_id("pre-migrate 2024-05-01T12:00:00Z");
        assert!(id.starts_with("pre-migrate-2024-05-01T12-00-00Z-"));
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    }

    #[test]
    fn test_backup_ids_are_unique() {
        assert_ne!(backup_id("same"), backup_id("same"));
    }
}
