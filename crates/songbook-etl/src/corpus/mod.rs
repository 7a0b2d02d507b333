//! Corpus parsing: the flat text backup → raw candidate records.
//!
//! A corpus is a Markdown-like document. Each entry is introduced by an
//! anchor (`<a id="...">`) and/or a `##` heading holding the title, may
//! carry one fenced lyrics block, a `Notes` sub-heading, and
//! `<!-- name: value -->` metadata comments. Entries are separated by
//! horizontal rules. Every part is optional; a section without a title is
//! skipped and counted rather than failing the parse.

pub mod labels;
pub mod parser;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use songbook_core::Source;
use std::fmt;

pub use parser::{parse, parse_corpus, CorpusParser, ParsedCorpus, Section};

/// A candidate record exactly as a source produced it, before
/// normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: String,
    /// A previously assigned key (anchor id or `key` metadata).
    pub key_hint: Option<String>,
    pub lyrics: Option<String>,
    pub notes: Option<String>,
    pub sounds_like: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub source: Source,
}

impl RawRecord {
    #[must_use]
    pub fn new(title: impl Into<String>, source: Source) -> Self {
        Self {
            title: title.into(),
            key_hint: None,
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
}

/// A corpus section that yielded no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseSkip {
    /// Zero-based section index within the corpus.
    pub section: usize,
    /// One-based line number where the section starts.
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ParseSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "section {} (line {}): {}",
            self.section, self.line, self.reason
        )
    }
}
