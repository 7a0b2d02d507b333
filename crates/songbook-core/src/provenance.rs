use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{SongField, SongKey};

/// Where a candidate value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// The flat text backup.
    Corpus,
    /// The document store being merged into.
    Store,
    /// A legacy per-field override held alongside the store.
    FieldOverride,
    /// A local cache dump (e.g. an exported browser cache).
    LocalCache,
}

impl Source {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Corpus => "corpus",
            Self::Store => "store",
            Self::FieldOverride => "field_override",
            Self::LocalCache => "local_cache",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A legacy per-field value stored outside the song document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverride {
    pub key: SongKey,
    pub field: SongField,
    pub value: String,

    /// When the override was written, if the legacy store tracked it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FieldOverride {
    #[must_use]
    pub fn new(key: SongKey, field: SongField, value: impl Into<String>) -> Self {
        Self {
            key,
            field,
            value: value.into(),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}
