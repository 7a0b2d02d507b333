//! Explicit, user-initiated store operations.
//!
//! Each operation holds the store for its duration and backs up the
//! current state before any destructive write. None of them runs as part
//! of a migration pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use songbook_core::{
    BackupInfo, BackupLocation, SongCatalog, SongField, SongKey, SongRecord, StorageAdapter,
    StoreSnapshot,
};

use crate::error::{MigrationError, MigrationResult};
use crate::tombstone::TombstoneTracker;

/// Result of [`delete_song`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub removed: Option<SongRecord>,
    /// `false` when the key was already tombstoned.
    pub newly_tombstoned: bool,
    pub backup: Option<BackupLocation>,
}

/// Result of [`prune_empty`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    /// Keys of empty records, in catalog order.
    pub empty: Vec<SongKey>,
    /// Whether they were removed (only with confirmation).
    pub removed: bool,
    pub backup: Option<BackupLocation>,
}

/// Result of [`restore_backup`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub restored_from: String,
    pub songs: usize,
    pub tombstones: usize,
    /// Backup of the state that was replaced.
    pub backup: BackupLocation,
}

/// Store contents at a glance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub store: String,
    pub songs: usize,
    pub empty: usize,
    pub tombstones: usize,
    pub field_overrides: usize,
    pub backups: usize,
    pub latest_backup: Option<BackupInfo>,
}

fn take_backup(
    store: &mut dyn StorageAdapter,
    snapshot: &StoreSnapshot,
    operation: &str,
    now: DateTime<Utc>,
) -> MigrationResult<BackupLocation> {
    let label = format!("pre-{}-{}", operation, now.format("%Y%m%dT%H%M%SZ"));
    let backup = store
        .backup(snapshot, &label)
        .map_err(MigrationError::BackupFailure)?;
    log::info!("Backed up current state to {}", backup);
    Ok(backup)
}

fn write_state(
    store: &mut dyn StorageAdapter,
    songs: Option<&SongCatalog>,
    tombstones: Option<&TombstoneTracker>,
    backup: &BackupLocation,
) -> MigrationResult<()> {
    let failed = |source: songbook_core::Error| MigrationError::WriteFailure {
        backup: backup.clone(),
        source,
    };
    if let Some(songs) = songs {
        store.write_all(songs).map_err(failed)?;
    }
    if let Some(tombstones) = tombstones {
        store.write_tombstones(tombstones.as_slice()).map_err(failed)?;
    }
    Ok(())
}

/// Delete a song and tombstone its key so no later merge brings it back.
///
/// Deleting a key with no live record still tombstones it.
pub fn delete_song(
    store: &mut dyn StorageAdapter,
    key: &str,
    now: DateTime<Utc>,
) -> MigrationResult<DeleteOutcome> {
    let _hold = store.hold()?;
    let snapshot = store.snapshot(now)?;
    let mut tombstones = TombstoneTracker::from(snapshot.tombstones().to_vec());

    let mut songs = snapshot.songs().clone();
    let removed = songs.remove(key);
    let newly_tombstoned = tombstones.record(SongKey::from_stored(key), now);

    if removed.is_none() && !newly_tombstoned {
        log::info!("{} is already deleted", key);
        return Ok(DeleteOutcome {
            removed,
            newly_tombstoned,
            backup: None,
        });
    }

    let backup = take_backup(store, &snapshot, "delete", now)?;
    let songs = removed.as_ref().map(|_| &songs);
    write_state(store, songs, Some(&tombstones), &backup)?;
    log::info!("Deleted {} (tombstoned at {})", key, now);

    Ok(DeleteOutcome {
        removed,
        newly_tombstoned,
        backup: Some(backup),
    })
}

/// Lift a tombstone. The song itself is not restored; a later pass or a
/// backup restore may bring it back. Returns whether a tombstone existed.
pub fn undelete_song(store: &mut dyn StorageAdapter, key: &str) -> MigrationResult<bool> {
    let _hold = store.hold()?;
    let mut tombstones = TombstoneTracker::from(store.read_tombstones()?);
    if !tombstones.undelete(key) {
        log::info!("{} is not tombstoned", key);
        return Ok(false);
    }
    store.write_tombstones(tombstones.as_slice())?;
    log::info!("Removed tombstone for {}", key);
    Ok(true)
}

/// List empty records and, only when `confirm` is set, remove them.
///
/// Pruned keys are not tombstoned: an empty record carries nothing worth
/// protecting from re-import.
pub fn prune_empty(
    store: &mut dyn StorageAdapter,
    confirm: bool,
    now: DateTime<Utc>,
) -> MigrationResult<PruneOutcome> {
    let _hold = store.hold()?;
    let snapshot = store.snapshot(now)?;
    let empty: Vec<SongKey> = snapshot
        .songs()
        .iter()
        .filter(|r| r.is_empty())
        .map(|r| r.key.clone())
        .collect();

    if !confirm || empty.is_empty() {
        return Ok(PruneOutcome {
            empty,
            removed: false,
            backup: None,
        });
    }

    let backup = take_backup(store, &snapshot, "prune", now)?;
    let kept: SongCatalog = snapshot
        .songs()
        .iter()
        .filter(|r| !r.is_empty())
        .cloned()
        .collect();
    write_state(store, Some(&kept), None, &backup)?;
    log::info!("Pruned {} empty records", empty.len());

    Ok(PruneOutcome {
        empty,
        removed: true,
        backup: Some(backup),
    })
}

/// Replace the store contents with a backup, after backing up the
/// current state.
///
/// Versions never go backwards: a restored record whose content differs
/// from the live record for the same key is stamped one version past the
/// live one.
pub fn restore_backup(
    store: &mut dyn StorageAdapter,
    backup_id: &str,
    now: DateTime<Utc>,
) -> MigrationResult<RestoreOutcome> {
    let _hold = store.hold()?;
    let (restored, tombstones) = store.read_backup(backup_id)?.into_parts();
    let current = store.snapshot(now)?;

    let songs: SongCatalog = restored
        .into_records()
        .into_iter()
        .map(|mut record| {
            if let Some(live) = current.songs().get(record.key.as_str()) {
                if same_content(live, &record) {
                    return live.clone();
                }
                record.version = record.version.max(live.version) + 1;
                record.updated_at = now.max(record.created_at);
            }
            record
        })
        .collect();
    let tombstones = TombstoneTracker::from(tombstones);

    let backup = take_backup(store, &current, "restore", now)?;
    write_state(store, Some(&songs), Some(&tombstones), &backup)?;
    log::info!("Restored {} songs from backup {}", songs.len(), backup_id);

    Ok(RestoreOutcome {
        restored_from: backup_id.to_string(),
        songs: songs.len(),
        tombstones: tombstones.len(),
        backup,
    })
}

fn same_content(a: &SongRecord, b: &SongRecord) -> bool {
    a.title == b.title
        && SongField::OPTIONAL
            .iter()
            .all(|&field| a.field(field) == b.field(field))
}

/// Backups, oldest first.
pub fn list_backups(store: &dyn StorageAdapter) -> MigrationResult<Vec<BackupInfo>> {
    Ok(store.list_backups()?)
}

/// Summarize the store.
pub fn status(store: &dyn StorageAdapter) -> MigrationResult<StoreStatus> {
    let songs = store.read_all()?;
    let backups = store.list_backups()?;
    Ok(StoreStatus {
        store: store.describe(),
        songs: songs.len(),
        empty: songs.iter().filter(|r| r.is_empty()).count(),
        tombstones: store.read_tombstones()?.len(),
        field_overrides: store.read_field_overrides()?.len(),
        backups: backups.len(),
        latest_backup: backups.last().cloned(),
    })
}
