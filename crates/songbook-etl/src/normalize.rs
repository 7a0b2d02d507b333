//! Record normalization: raw candidates → keyed, trimmed [`Candidate`]s.

use regex::Regex;
use songbook_core::{Candidate, SongKey};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

use crate::corpus::RawRecord;

static ANCHOR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\{#[^}]*\}\s*$").expect("anchor suffix pattern is valid"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.+?)\]\([^)]*\)$").expect("link pattern is valid"));
static NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:no\.?|#)\s*)?\d{1,4}(?:\s*[.):\]](?:\s+|$)|\s*[-–—](?:\s+|$))|^#\d{1,4}\s+")
        .expect("numbering pattern is valid")
});
static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:song|title|track)\s*[:\-–—]\s*").expect("prefix pattern is valid")
});

const WRAPPERS: &[(&str, &str)] = &[
    ("**", "**"),
    ("__", "__"),
    ("*", "*"),
    ("_", "_"),
    ("`", "`"),
    ("[", "]"),
    ("\"", "\""),
    ("“", "”"),
    ("'", "'"),
];

/// Strip numbering, bracket, emphasis and prefix decoration from a title
/// and collapse its whitespace.
#[must_use]
pub fn clean_title(raw: &str) -> String {
    let mut title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    // Decoration can nest ("**1. [Title]**"); peel until stable.
    for _ in 0..8 {
        let before = title.clone();
        title = ANCHOR_SUFFIX.replace(&title, "").trim().to_string();
        title = LINK.replace(&title, "$1").trim().to_string();
        title = NUMBERING.replace(&title, "").trim().to_string();
        title = PREFIX.replace(&title, "").trim().to_string();
        for (open, close) in WRAPPERS {
            if title.len() > open.len() + close.len()
                && title.starts_with(open)
                && title.ends_with(close)
            {
                title = title[open.len()..title.len() - close.len()].trim().to_string();
            }
        }
        if title == before {
            break;
        }
    }
    title
}

/// A candidate that cannot be keyed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("empty title after cleanup (raw title {raw:?})")]
    EmptyTitle { raw: String },

    #[error("title {title:?} derives an empty key")]
    EmptyKey { title: String },
}

/// Normalize one raw record.
///
/// The key is a previously assigned key hint when one is present (used
/// verbatim, keys are never regenerated), otherwise derived from the
/// cleaned title.
pub fn normalize(raw: RawRecord) -> Result<Candidate, ValidationError> {
    let title = clean_title(&raw.title);
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle { raw: raw.title });
    }

    let key = raw
        .key_hint
        .as_deref()
        .map(str::trim)
        .filter(|hint| !hint.is_empty() && !hint.contains(char::is_whitespace))
        .map(SongKey::from_stored)
        .or_else(|| SongKey::derive(&title));
    let Some(key) = key else {
        return Err(ValidationError::EmptyKey { title });
    };

    let mut candidate = Candidate::new(key, title, raw.source);
    candidate.lyrics = trim_block(raw.lyrics);
    candidate.notes = trim_block(raw.notes);
    candidate.sounds_like = trim_line(raw.sounds_like);
    candidate.image = trim_line(raw.image);
    candidate.audio = trim_line(raw.audio);
    candidate.created_at = raw.created_at;
    candidate.updated_at = raw.updated_at;
    Ok(candidate)
}

/// Drop leading/trailing blank lines and trailing whitespace; keep the
/// indentation of the first content line.
fn trim_block(value: Option<String>) -> Option<String> {
    let value = value?;
    let lines: Vec<&str> = value.lines().map(str::trim_end).collect();
    let start = lines.iter().position(|l| !l.is_empty())?;
    let end = lines.iter().rposition(|l| !l.is_empty())?;
    Some(lines[start..=end].join("\n"))
}

fn trim_line(value: Option<String>) -> Option<String> {
    let value = value?;
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// The outcome of normalizing a batch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub candidates: Vec<Candidate>,
    pub errors: Vec<ValidationError>,
}

impl fmt::Display for NormalizedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} normalized, {} rejected",
            self.candidates.len(),
            self.errors.len()
        )
    }
}

/// Normalize every record, excluding (and logging) the ones that fail.
pub fn normalize_batch(raws: impl IntoIterator<Item = RawRecord>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for raw in raws {
        match normalize(raw) {
            Ok(candidate) => batch.candidates.push(candidate),
            Err(e) => {
                log::warn!("Excluding record: {}", e);
                batch.errors.push(e);
            }
        }
    }
    batch
}
