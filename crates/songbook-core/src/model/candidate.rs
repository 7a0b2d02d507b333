use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::field::SongField;
use crate::model::key::SongKey;
use crate::provenance::Source;

/// A normalized, song-shaped value produced by any source during a pass.
///
/// Candidates carry whatever timestamps their source knew; a corpus entry
/// without metadata has none. They never reach a store directly: the
/// merger turns them into [`SongRecord`](crate::SongRecord)s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: SongKey,
    pub title: String,
    pub lyrics: Option<String>,
    pub notes: Option<String>,
    pub sounds_like: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub source: Source,
}

impl Candidate {
    #[must_use]
    pub fn new(key: SongKey, title: impl Into<String>, source: Source) -> Self {
        Self {
            key,
            title: title.into(),
            lyrics: None,
            notes: None,
            sounds_like: None,
            image: None,
            audio: None,
            created_at: None,
            updated_at: None,
            source,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: SongField, value: impl Into<String>) -> Self {
        self.set_field(field, value);
        self
    }

    #[must_use]
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Read a field; blank text reads as absent.
    #[must_use]
    pub fn field(&self, field: SongField) -> Option<&str> {
        let value = match field {
            SongField::Title => Some(&self.title),
            SongField::Lyrics => self.lyrics.as_ref(),
            SongField::Notes => self.notes.as_ref(),
            SongField::SoundsLike => self.sounds_like.as_ref(),
            SongField::Image => self.image.as_ref(),
            SongField::Audio => self.audio.as_ref(),
        };
        value.map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn set_field(&mut self, field: SongField, value: impl Into<String>) {
        let value = value.into();
        match field {
            SongField::Title => self.title = value,
            SongField::Lyrics => self.lyrics = Some(value),
            SongField::Notes => self.notes = Some(value),
            SongField::SoundsLike => self.sounds_like = Some(value),
            SongField::Image => self.image = Some(value),
            SongField::Audio => self.audio = Some(value),
        }
    }

    /// The timestamp used to order competing candidates: `updated_at`,
    /// falling back to `created_at`.
    #[must_use]
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}
