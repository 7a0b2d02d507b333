use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// The stable identifier of a song record.
///
/// Keys are derived from titles: lower-cased, stripped of every character
/// that is neither alphanumeric, whitespace nor a hyphen, with whitespace
/// runs collapsed to single hyphens and leading/trailing hyphens trimmed.
/// Keys read back from a store are taken verbatim; a key is never
/// regenerated once a record holds it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongKey(String);

impl SongKey {
    /// Derive a key from free text. Returns `None` when nothing survives.
    #[must_use]
    pub fn derive(text: &str) -> Option<Self> {
        let key = derive_key(text);
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    /// Wrap a key exactly as persisted.
    #[must_use]
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SongKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SongKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Derive the key text for a title. Idempotent on its own output.
#[must_use]
pub fn derive_key(text: &str) -> String {
    let lowered = text.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('-')
        .to_string()
}
