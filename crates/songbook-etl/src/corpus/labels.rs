//! Recognition of the free-text "sounds like" label inside notes.
//!
//! Labels are tried in priority order and the first pattern that matches
//! any line wins. The matched line is lifted out of the notes; when no
//! pattern matches, the notes are returned untouched.

use regex::Regex;
use std::sync::LazyLock;

/// Influence labels, highest priority first.
static LABELS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^\s*(?:[-*+]\s+)?(?:\*\*|__)?sounds?[\s-]+like\b(?:\*\*|__)?\s*(?::|-|–|—|\s)\s*(?:\*\*|__)?\s*(?P<value>\S.*?)\s*$",
        r"(?i)^\s*(?:[-*+]\s+)?(?:\*\*|__)?(?:influences?|inspired\s+by|in\s+the\s+style\s+of)(?:\*\*|__)?\s*(?::|-|–|—)\s*(?:\*\*|__)?\s*(?P<value>\S.*?)\s*$",
        r"(?i)^\s*(?:[-*+]\s+)?(?:\*\*|__)?(?:style|vibe|reference)(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(?P<value>\S.*?)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("influence label patterns are valid"))
    .collect()
});

/// Result of scanning notes for an influence label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub sounds_like: Option<String>,
    pub notes: String,
}

/// Lift the first recognized influence line out of `notes`.
#[must_use]
pub fn extract_sounds_like(notes: &str) -> Extracted {
    for label in LABELS.iter() {
        let hit = notes.lines().enumerate().find_map(|(idx, line)| {
            label
                .captures(line)
                .and_then(|c| c.name("value"))
                .map(|m| (idx, strip_emphasis(m.as_str())))
        });

        if let Some((idx, value)) = hit {
            if value.is_empty() {
                continue;
            }
            return Extracted {
                sounds_like: Some(value),
                notes: remove_line(notes, idx),
            };
        }
    }

    Extracted {
        sounds_like: None,
        notes: notes.to_string(),
    }
}

fn strip_emphasis(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '*' || c == '_')
        .trim()
        .to_string()
}

/// Whether `line` would be read as an influence label.
pub fn is_label_line(line: &str) -> bool {
    LABELS.iter().any(|label| label.is_match(line))
}

/// Drop line `idx` and close up the gap it leaves. Blank lines elsewhere
/// are kept as written.
fn remove_line(notes: &str, idx: usize) -> String {
    let blank = |line: &&str| line.trim().is_empty();
    let mut lines: Vec<&str> = notes.lines().collect();
    lines.remove(idx);
    while idx > 0 && idx < lines.len() && blank(&lines[idx - 1]) && blank(&lines[idx]) {
        lines.remove(idx);
    }
    if idx == 0 {
        while lines.first().is_some_and(blank) {
            lines.remove(0);
        }
    }
    if idx >= lines.len() {
        while lines.last().is_some_and(blank) {
            lines.pop();
        }
    }
    lines.join("\n")
}
