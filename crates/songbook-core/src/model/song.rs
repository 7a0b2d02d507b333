use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::field::SongField;
use crate::model::key::SongKey;

/// The canonical song entity as held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub key: SongKey,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Free-text influence descriptor ("sounds like ...").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sounds_like: Option<String>,

    /// Opaque blob reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Opaque blob reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Starts at 1 and grows by one per effective mutation.
    pub version: u64,
}

impl SongRecord {
    /// A fresh version-1 record stamped at `now`.
    #[must_use]
    pub fn new(key: SongKey, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            key,
            title: title.into(),
            lyrics: None,
            notes: None,
            sounds_like: None,
            image: None,
            audio: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[must_use]
    pub fn with_lyrics(mut self, lyrics: impl Into<String>) -> Self {
        self.lyrics = Some(lyrics.into());
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn with_sounds_like(mut self, sounds_like: impl Into<String>) -> Self {
        self.sounds_like = Some(sounds_like.into());
        self
    }

    /// Read an optional field; blank text reads as absent.
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

    /// Overwrite a field. Callers decide whether the write is allowed.
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

    /// Whether the title was ever set by a human (it differs from the key).
    #[must_use]
    pub fn has_human_title(&self) -> bool {
        let title = self.title.trim();
        !title.is_empty() && title != self.key.as_str()
    }

    /// An empty record has no content and no human-entered title. Empty
    /// records are pruning candidates, never pruned implicitly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_human_title() && SongField::OPTIONAL.iter().all(|f| self.field(*f).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SongKey {
        SongKey::from_stored(s)
    }

    #[test]
    fn test_song_new() {
        let now = Utc::now();
        let song = SongRecord::new(key("kentucky-hills"), "Kentucky Hills", now);
        assert_eq!(song.version, 1);
        assert_eq!(song.created_at, song.updated_at);
        assert!(song.lyrics.is_none());
    }

    #[test]
    fn test_blank_field_reads_as_absent() {
        let song = SongRecord::new(key("x"), "X", Utc::now()).with_notes("  \n ");
        assert_eq!(song.field(SongField::Notes), None);
    }

    #[test]
    fn test_set_field() {
        let mut song = SongRecord::new(key("x"), "X", Utc::now());
        song.set_field(SongField::SoundsLike, "Gillian Welch");
        assert_eq!(song.field(SongField::SoundsLike), Some("Gillian Welch"));
    }

    #[test]
    fn test_empty_classification() {
        let now = Utc::now();
        assert!(SongRecord::new(key("untitled-3"), "untitled-3", now).is_empty());
        assert!(SongRecord::new(key("untitled-3"), "", now).is_empty());
        assert!(!SongRecord::new(key("untitled-3"), "Untitled 3", now).is_empty());
        assert!(!SongRecord::new(key("untitled-3"), "untitled-3", now)
            .with_lyrics("la la")
            .is_empty());
    }

    #[test]
    fn test_json_uses_camel_case() {
        let song = SongRecord::new(key("x"), "X", Utc::now()).with_sounds_like("Y");
        let json = serde_json::to_value(&song).unwrap();
        assert!(json.get("soundsLike").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("lyrics").is_none());
    }
}
