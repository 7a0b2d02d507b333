//! Render a catalog back into the corpus format.
//!
//! The output parses back into the same records: anchors carry the keys,
//! metadata comments carry timestamps and media references, lyrics
//! fences are lengthened when the lyrics themselves contain a fence, and
//! notes lines that look like structure are escaped with a leading `\`.

use chrono::SecondsFormat;
use songbook_core::{SongCatalog, SongRecord};
use std::fmt;

use crate::corpus::parser::escape_notes_line;

/// Render the whole catalog, in catalog order.
#[must_use]
pub fn render_corpus(catalog: &SongCatalog) -> String {
    CorpusDisplay(catalog).to_string()
}

/// Lazily formats a catalog as a corpus document.
#[derive(Debug, Clone, Copy)]
pub struct CorpusDisplay<'a>(pub &'a SongCatalog);

impl fmt::Display for CorpusDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Songbook")?;
        for record in self.0 {
            writeln!(f)?;
            write_record(f, record)?;
            write!(f, "\n---\n")?;
        }
        Ok(())
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, record: &SongRecord) -> fmt::Result {
    writeln!(f, "<a id=\"{}\"></a>", record.key)?;
    writeln!(f, "## {}", record.title.trim())?;
    writeln!(
        f,
        "<!-- created: {} -->",
        record.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )?;
    writeln!(
        f,
        "<!-- updated: {} -->",
        record.updated_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )?;
    if let Some(image) = non_blank(record.image.as_deref()) {
        writeln!(f, "<!-- image: {image} -->")?;
    }
    if let Some(audio) = non_blank(record.audio.as_deref()) {
        writeln!(f, "<!-- audio: {audio} -->")?;
    }

    if let Some(lyrics) = non_blank(record.lyrics.as_deref()) {
        let fence = "`".repeat(fence_len(lyrics));
        write!(f, "\n{fence}\n{lyrics}\n{fence}\n")?;
    }

    let sounds_like = non_blank(record.sounds_like.as_deref());
    let notes = non_blank(record.notes.as_deref());
    if sounds_like.is_some() || notes.is_some() {
        write!(f, "\n### Notes\n\n")?;
        if let Some(sounds_like) = sounds_like {
            writeln!(f, "Sounds like: {sounds_like}")?;
        }
        if let Some(notes) = notes {
            for line in notes.lines() {
                writeln!(f, "{}", escape_notes_line(line))?;
            }
        }
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// One backtick longer than any backtick run opening a lyrics line.
fn fence_len(lyrics: &str) -> usize {
    lyrics
        .lines()
        .map(|line| line.trim_start().chars().take_while(|&c| c == '`').count())
        .max()
        .unwrap_or(0)
        .max(2)
        + 1
}
