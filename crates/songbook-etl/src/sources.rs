//! Pass inputs other than the store itself.
//!
//! Every source ends up as [`RawRecord`]s tagged with their [`Source`], so
//! normalization, deduplication and merging never care where a value came
//! from.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use songbook_core::{FieldOverride, SongField, Source};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::corpus::parser::parse_timestamp;
use crate::corpus::{parse_corpus, ParseSkip, RawRecord};
use crate::error::{MigrationError, MigrationResult};

/// Where an input's text comes from.
#[derive(Debug, Clone)]
pub enum Origin {
    File(PathBuf),
    Text { label: String, text: String },
}

impl Origin {
    fn read(&self) -> MigrationResult<String> {
        match self {
            Self::File(path) => {
                std::fs::read_to_string(path).map_err(|source| MigrationError::CorpusRead {
                    path: path.clone(),
                    source,
                })
            }
            Self::Text { text, .. } => Ok(text.clone()),
        }
    }

    fn path(&self) -> PathBuf {
        match self {
            Self::File(path) => path.clone(),
            Self::Text { label, .. } => PathBuf::from(label),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Text { label, .. } => f.write_str(label),
        }
    }
}

/// One input of a migration pass.
#[derive(Debug, Clone)]
pub struct Input {
    pub source: Source,
    pub origin: Origin,
}

impl Input {
    #[must_use]
    pub fn corpus_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Corpus,
            origin: Origin::File(path.into()),
        }
    }

    #[must_use]
    pub fn corpus_text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: Source::Corpus,
            origin: Origin::Text {
                label: label.into(),
                text: text.into(),
            },
        }
    }

    #[must_use]
    pub fn cache_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::LocalCache,
            origin: Origin::File(path.into()),
        }
    }

    #[must_use]
    pub fn cache_text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: Source::LocalCache,
            origin: Origin::Text {
                label: label.into(),
                text: text.into(),
            },
        }
    }

    /// Read and parse the input. Malformed corpus sections become skips;
    /// an unreadable input fails the whole pass.
    pub fn load(&self) -> MigrationResult<SourceBatch> {
        let text = self.origin.read()?;
        let mut batch = SourceBatch {
            source: self.source,
            label: self.origin.to_string(),
            records: Vec::new(),
            skips: Vec::new(),
        };
        match self.source {
            Source::LocalCache => {
                batch.records = parse_cache(&text).map_err(|source| {
                    MigrationError::InvalidCache {
                        path: self.origin.path(),
                        source,
                    }
                })?;
            }
            _ => {
                let parsed = parse_corpus(&text);
                batch.records = parsed.records;
                batch.skips = parsed.skips;
            }
        }
        log::info!(
            "Loaded {} {} records from {}",
            batch.records.len(),
            batch.source,
            batch.label
        );
        Ok(batch)
    }
}

/// The raw records one source produced.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: Source,
    pub label: String,
    pub records: Vec<RawRecord>,
    pub skips: Vec<ParseSkip>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Text(String),
    Millis(i64),
}

impl Timestamp {
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(text) => parse_timestamp(text.trim()),
            Self::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

/// One record of a local cache dump. Every field is optional and both
/// camelCase and snake_case spellings are accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CacheEntry {
    key: Option<String>,
    title: Option<String>,
    lyrics: Option<String>,
    notes: Option<String>,
    #[serde(alias = "sounds_like")]
    sounds_like: Option<String>,
    image: Option<String>,
    audio: Option<String>,
    #[serde(alias = "created_at")]
    created_at: Option<Timestamp>,
    #[serde(alias = "updated_at")]
    updated_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CacheDocument {
    List(Vec<CacheEntry>),
    Map(HashMap<String, CacheEntry>),
}

/// Parse a local cache dump: either an array of records or an object
/// mapping key → record. Map entries are taken in key order.
pub fn parse_cache(text: &str) -> Result<Vec<RawRecord>, serde_json::Error> {
    let entries: Vec<(Option<String>, CacheEntry)> = match serde_json::from_str(text)? {
        CacheDocument::List(list) => list.into_iter().map(|e| (None, e)).collect(),
        CacheDocument::Map(map) => {
            let mut entries: Vec<(String, CacheEntry)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries.into_iter().map(|(k, e)| (Some(k), e)).collect()
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|(map_key, entry)| cache_record(map_key, entry))
        .collect())
}

fn cache_record(map_key: Option<String>, entry: CacheEntry) -> Option<RawRecord> {
    let key_hint = entry.key.or(map_key).filter(|k| !k.trim().is_empty());
    let title = entry
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| key_hint.clone());
    let Some(title) = title else {
        log::warn!("Ignoring cache entry with neither key nor title");
        return None;
    };

    let mut record = RawRecord::new(title, Source::LocalCache);
    record.key_hint = key_hint;
    record.lyrics = entry.lyrics;
    record.notes = entry.notes;
    record.sounds_like = entry.sounds_like;
    record.image = entry.image;
    record.audio = entry.audio;
    record.created_at = entry.created_at.and_then(Timestamp::resolve);
    record.updated_at = entry.updated_at.and_then(Timestamp::resolve);
    Some(record)
}

/// Fold legacy per-field overrides into one raw record per key, in
/// first-seen key order. A record's title is its key unless a title
/// override exists; its timestamp is the newest override's.
pub fn overrides_to_records(overrides: &[FieldOverride]) -> Vec<RawRecord> {
    let mut records: Vec<RawRecord> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for ov in overrides {
        let pos = *index.entry(ov.key.as_str()).or_insert_with(|| {
            let mut record = RawRecord::new(ov.key.as_str(), Source::FieldOverride);
            record.key_hint = Some(ov.key.to_string());
            records.push(record);
            records.len() - 1
        });
        let record = &mut records[pos];
        let value = Some(ov.value.clone());
        match ov.field {
            SongField::Title => {
                if !ov.value.trim().is_empty() {
                    record.title = ov.value.clone();
                }
            }
            SongField::Lyrics => record.lyrics = value,
            SongField::Notes => record.notes = value,
            SongField::SoundsLike => record.sounds_like = value,
            SongField::Image => record.image = value,
            SongField::Audio => record.audio = value,
        }
        if ov.updated_at > record.updated_at {
            record.updated_at = ov.updated_at;
        }
    }
    records
}
