use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{SongCatalog, SongField, SongKey, SongRecord, Tombstone};
use crate::provenance::FieldOverride;
use crate::snapshot::StoreSnapshot;

use super::migrations::MIGRATIONS;
use super::{backup_id, BackupInfo, BackupLocation, StorageAdapter, StoreHold};

/// A SQLite-backed song store.
///
/// Songs, tombstones, legacy field overrides and backups live in one
/// database file. Whole-catalog writes run in a single transaction.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    held: Arc<AtomicBool>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
            held: Arc::new(AtomicBool::new(false)),
        };
        store.apply_migrations()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            path: None,
            held: Arc::new(AtomicBool::new(false)),
        };
        store.apply_migrations()?;
        Ok(store)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    /// Store a legacy per-field override (replacing any previous value).
    pub fn insert_field_override(&self, field_override: &FieldOverride) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO field_overrides (key, field, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                field_override.key.as_str(),
                field_override.field.as_str(),
                field_override.value,
                field_override.updated_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}

// Song documents
impl SqliteStore {
    fn row_to_song(row: &rusqlite::Row) -> rusqlite::Result<SongRecord> {
        let version: i64 = row.get(9)?;
        Ok(SongRecord {
            key: SongKey::from_stored(row.get::<_, String>(0)?),
            title: row.get(1)?,
            lyrics: row.get(2)?,
            notes: row.get(3)?,
            sounds_like: row.get(4)?,
            image: row.get(5)?,
            audio: row.get(6)?,
            created_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
            updated_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
            version: u64::try_from(version).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Integer, Box::new(e))
            })?,
        })
    }
}

impl StorageAdapter for SqliteStore {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }

    fn hold(&self) -> Result<StoreHold> {
        match &self.path {
            Some(path) => StoreHold::lock_file(path),
            None => StoreHold::flag(&self.held, "sqlite::memory:"),
        }
    }

    fn read_all(&self) -> Result<SongCatalog> {
        let mut stmt = self.conn.prepare(
            "SELECT key, title, lyrics, notes, sounds_like, image, audio,
                    created_at, updated_at, version
             FROM songs
             ORDER BY position",
        )?;
        let songs = stmt
            .query_map([], Self::row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs.into_iter().collect())
    }

    fn read_tombstones(&self) -> Result<Vec<Tombstone>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, deleted_at FROM tombstones ORDER BY deleted_at, key")?;
        let tombstones = stmt
            .query_map([], |row| {
                Ok(Tombstone {
                    key: SongKey::from_stored(row.get::<_, String>(0)?),
                    deleted_at: parse_timestamp(1, &row.get::<_, String>(1)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tombstones)
    }

    fn read_field_overrides(&self) -> Result<Vec<FieldOverride>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, field, value, updated_at FROM field_overrides ORDER BY key, field",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut overrides = Vec::with_capacity(rows.len());
        for (key, field, value, updated_at) in rows {
            let Ok(field) = field.parse::<SongField>() else {
                log::warn!("Ignoring override {key}/{field}: unknown field");
                continue;
            };
            let mut field_override = FieldOverride::new(SongKey::from_stored(key), field, value);
            if let Some(ts) = updated_at {
                field_override.updated_at = Some(parse_timestamp(3, &ts)?);
            }
            overrides.push(field_override);
        }
        Ok(overrides)
    }

    fn write_all(&mut self, songs: &SongCatalog) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM songs", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO songs (
                    key, position, title, lyrics, notes, sounds_like, image, audio,
                    created_at, updated_at, version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (position, song) in songs.iter().enumerate() {
                stmt.execute(rusqlite::params![
                    song.key.as_str(),
                    i64::try_from(position).unwrap_or(i64::MAX),
                    song.title,
                    song.lyrics,
                    song.notes,
                    song.sounds_like,
                    song.image,
                    song.audio,
                    song.created_at.to_rfc3339(),
                    song.updated_at.to_rfc3339(),
                    i64::try_from(song.version).unwrap_or(i64::MAX),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_tombstones(&mut self, tombstones: &[Tombstone]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tombstones", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO tombstones (key, deleted_at) VALUES (?1, ?2)")?;
            for tombstone in tombstones {
                stmt.execute(rusqlite::params![
                    tombstone.key.as_str(),
                    tombstone.deleted_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn backup(&mut self, snapshot: &StoreSnapshot, label: &str) -> Result<BackupLocation> {
        let id = backup_id(label);
        let payload = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO backups (id, label, created_at, record_count, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id,
                label,
                Utc::now().to_rfc3339(),
                i64::try_from(snapshot.songs().len()).unwrap_or(i64::MAX),
                payload,
            ],
        )?;
        let location = format!("{}#backups/{}", self.describe(), id);
        Ok(BackupLocation { id, location })
    }

    fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, label, created_at, record_count FROM backups ORDER BY created_at, id",
        )?;
        let describe = self.describe();
        let backups = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let count: i64 = row.get(3)?;
                Ok(BackupInfo {
                    location: BackupLocation {
                        location: format!("{describe}#backups/{id}"),
                        id,
                    },
                    label: row.get(1)?,
                    created_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
                    record_count: usize::try_from(count).unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(backups)
    }

    fn read_backup(&self, id: &str) -> Result<StoreSnapshot> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM backups WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        let payload = payload.ok_or_else(|| Error::NotFound {
            entity: "backup",
            id: id.to_string(),
        })?;
        Ok(serde_json::from_str(&payload)?)
    }

    fn delete_field(&mut self, key: &SongKey, field: SongField) -> Result<()> {
        self.conn.execute(
            "DELETE FROM field_overrides WHERE key = ?1 AND field = ?2",
            rusqlite::params![key.as_str(), field.as_str()],
        )?;
        Ok(())
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
