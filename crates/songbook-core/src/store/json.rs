use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{SongCatalog, SongField, SongKey, Tombstone};
use crate::provenance::FieldOverride;
use crate::snapshot::StoreSnapshot;

use super::{backup_id, BackupInfo, BackupLocation, StorageAdapter, StoreHold};

const DOCUMENT_FORMAT: u32 = 1;

/// The on-disk JSON document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    #[serde(default)]
    format_version: u32,
    #[serde(default)]
    songs: SongCatalog,
    #[serde(default)]
    tombstones: Vec<Tombstone>,
    #[serde(default)]
    field_overrides: Vec<FieldOverride>,
}

/// A backup file: the snapshot plus enough metadata to list it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupEnvelope {
    id: String,
    label: String,
    created_at: DateTime<Utc>,
    snapshot: StoreSnapshot,
}

/// A song store kept in a single JSON document.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// document, so readers never observe a half-written store. Backups are
/// separate files in `backup_dir`, optionally gzip-compressed.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    backup_dir: PathBuf,
    compress_backups: bool,
}

impl JsonFileStore {
    /// Use the document at `path`; it is created on first write.
    /// Backups default to a `backups` directory next to it.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_dir = path
            .parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"));
        Self {
            path,
            backup_dir,
            compress_backups: false,
        }
    }

    #[must_use]
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_compressed_backups(mut self, compress: bool) -> Self {
        self.compress_backups = compress;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Replace the legacy override collection (used when importing legacy data).
    pub fn write_field_overrides(&mut self, overrides: &[FieldOverride]) -> Result<()> {
        let mut doc = self.load()?;
        doc.field_overrides = overrides.to_vec();
        self.save(&doc)
    }

    fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument {
                format_version: DOCUMENT_FORMAT,
                ..StoreDocument::default()
            });
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let doc: StoreDocument = serde_json::from_reader(reader)?;
        if doc.format_version > DOCUMENT_FORMAT {
            return Err(Error::InvalidData(format!(
                "{} has format version {}, newer than supported {}",
                self.path.display(),
                doc.format_version,
                DOCUMENT_FORMAT
            )));
        }
        Ok(doc)
    }

    fn save(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer_pretty(&mut writer, doc)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn backup_file(&self, id: &str) -> Option<PathBuf> {
        [format!("{id}.json.gz"), format!("{id}.json")]
            .into_iter()
            .map(|name| self.backup_dir.join(name))
            .find(|p| p.exists())
    }

    fn read_envelope(path: &Path) -> Result<BackupEnvelope> {
        let file = BufReader::new(File::open(path)?);
        let is_gz = path.extension().is_some_and(|ext| ext == "gz");
        let envelope = if is_gz {
            let mut json = String::new();
            GzDecoder::new(file).read_to_string(&mut json)?;
            serde_json::from_str(&json)?
        } else {
            serde_json::from_reader(file)?
        };
        Ok(envelope)
    }
}

impl StorageAdapter for JsonFileStore {
    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn hold(&self) -> Result<StoreHold> {
        StoreHold::lock_file(&self.path)
    }

    fn read_all(&self) -> Result<SongCatalog> {
        Ok(self.load()?.songs)
    }

    fn read_tombstones(&self) -> Result<Vec<Tombstone>> {
        Ok(self.load()?.tombstones)
    }

    fn read_field_overrides(&self) -> Result<Vec<FieldOverride>> {
        Ok(self.load()?.field_overrides)
    }

    fn write_all(&mut self, songs: &SongCatalog) -> Result<()> {
        let mut doc = self.load()?;
        doc.format_version = DOCUMENT_FORMAT;
        doc.songs = songs.clone();
        self.save(&doc)
    }

    fn write_tombstones(&mut self, tombstones: &[Tombstone]) -> Result<()> {
        let mut doc = self.load()?;
        doc.tombstones = tombstones.to_vec();
        self.save(&doc)
    }

    fn backup(&mut self, snapshot: &StoreSnapshot, label: &str) -> Result<BackupLocation> {
        std::fs::create_dir_all(&self.backup_dir)?;
        let id = backup_id(label);
        let envelope = BackupEnvelope {
            id: id.clone(),
            label: label.to_string(),
            created_at: Utc::now(),
            snapshot: snapshot.clone(),
        };

        let path = if self.compress_backups {
            let path = self.backup_dir.join(format!("{id}.json.gz"));
            let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
            serde_json::to_writer(&mut encoder, &envelope)?;
            encoder.finish()?.sync_all()?;
            path
        } else {
            let path = self.backup_dir.join(format!("{id}.json"));
            let mut writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(&mut writer, &envelope)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            path
        };

        Ok(BackupLocation {
            id,
            location: path.display().to_string(),
        })
    }

    fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let name = path.to_string_lossy();
            if !(name.ends_with(".json") || name.ends_with(".json.gz")) {
                continue;
            }
            match Self::read_envelope(&path) {
                Ok(envelope) => backups.push(BackupInfo {
                    location: BackupLocation {
                        id: envelope.id,
                        location: path.display().to_string(),
                    },
                    label: envelope.label,
                    created_at: envelope.created_at,
                    record_count: envelope.snapshot.songs().len(),
                }),
                Err(e) => log::warn!("Skipping unreadable backup {}: {}", path.display(), e),
            }
        }
        backups.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.location.id.cmp(&b.location.id))
        });
        Ok(backups)
    }

    fn read_backup(&self, id: &str) -> Result<StoreSnapshot> {
        let path = self.backup_file(id).ok_or_else(|| Error::NotFound {
            entity: "backup",
            id: id.to_string(),
        })?;
        Ok(Self::read_envelope(&path)?.snapshot)
    }

    fn delete_field(&mut self, key: &SongKey, field: SongField) -> Result<()> {
        let mut doc = self.load()?;
        let before = doc.field_overrides.len();
        doc.field_overrides
            .retain(|o| !(o.key == *key && o.field == field));
        if doc.field_overrides.len() != before {
            self.save(&doc)?;
        }
        Ok(())
    }
}
