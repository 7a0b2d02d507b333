use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use songbook_core::Source;
use std::borrow::Cow;
use std::sync::LazyLock;

use super::labels::{extract_sounds_like, is_label_line};
use super::{ParseSkip, RawRecord};
use crate::normalize::clean_title;

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*<a\s+(?:id|name)\s*=\s*["']?([^"'\s>]+)["']?[^>]*>(?:\s*</a>)?(.*)$"#)
        .expect("anchor pattern is valid")
});
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,3}(#{1,6})\s+(.*?)(?:\s+#+)?\s*$").expect("heading pattern is valid")
});
static RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,3}(?:(?:-\s*){3,}|(?:\*\s*){3,}|(?:_\s*){3,})$").expect("rule pattern is valid")
});
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}(`{3,}|~{3,})(.*)$").expect("fence pattern is valid"));
static META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*<!--\s*([A-Za-z][A-Za-z_-]*)\s*:\s*(.*?)\s*-->\s*$")
        .expect("metadata pattern is valid")
});
static NOTES_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\*\*|__)?notes?(?:\*\*|__)?\s*(?::(?:\*\*|__)?\s*(.*?)|(?:\*\*|__)?)\s*$")
        .expect("notes label pattern is valid")
});
static LYRICS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\*\*|__)?lyrics(?:\*\*|__)?\s*:?\s*(?:\*\*|__)?\s*$")
        .expect("lyrics label pattern is valid")
});

/// One entry-sized slice of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    /// Zero-based position among non-blank sections.
    pub index: usize,
    /// One-based line number of the first line.
    pub start_line: usize,
    pub lines: Vec<&'a str>,
}

/// An open code fence: its character and run length.
#[derive(Debug, Clone, Copy)]
struct Fence {
    ch: char,
    len: usize,
}

impl Fence {
    fn open(line: &str) -> Option<Self> {
        let caps = FENCE.captures(line)?;
        let run = caps.get(1)?.as_str();
        let ch = run.chars().next()?;
        // A backtick fence's info string may not contain backticks.
        if ch == '`' && caps.get(2).is_some_and(|m| m.as_str().contains('`')) {
            return None;
        }
        Some(Self {
            ch,
            len: run.chars().count(),
        })
    }

    fn closes(self, line: &str) -> bool {
        let trimmed = line.trim();
        let indent = line.len() - line.trim_start().len();
        indent <= 3
            && trimmed.chars().count() >= self.len
            && trimmed.chars().all(|c| c == self.ch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Anchor,
    DocumentHeading,
    TitleHeading(usize),
    Rule,
    Other,
}

fn classify(line: &str) -> LineKind {
    if ANCHOR.is_match(line) {
        return LineKind::Anchor;
    }
    if RULE.is_match(line) {
        return LineKind::Rule;
    }
    if let Some(caps) = HEADING.captures(line) {
        let level = caps.get(1).map_or(0, |m| m.as_str().len());
        let text = caps.get(2).map_or("", |m| m.as_str());
        if level == 1 {
            return LineKind::DocumentHeading;
        }
        if !is_label(text) {
            return LineKind::TitleHeading(level);
        }
    }
    LineKind::Other
}

fn is_label(text: &str) -> bool {
    NOTES_LABEL.is_match(text) || LYRICS_LABEL.is_match(text)
}

/// Whether a line of notes text would be read back as section structure
/// (or as a label) rather than as plain notes.
fn is_structural(line: &str) -> bool {
    line.starts_with('\\')
        || ANCHOR.is_match(line)
        || RULE.is_match(line)
        || HEADING.is_match(line)
        || FENCE.is_match(line)
        || META.is_match(line)
        || is_label(line)
        || is_label_line(line)
}

/// Prefix a notes line with `\` when the parser would otherwise treat it
/// as structure.
pub(crate) fn escape_notes_line(line: &str) -> Cow<'_, str> {
    if is_structural(line) {
        Cow::Owned(format!("\\{line}"))
    } else {
        Cow::Borrowed(line)
    }
}

/// Inverse of [`escape_notes_line`].
pub(crate) fn unescape_notes_line(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if is_structural(rest) => rest,
        _ => line,
    }
}

/// Where in a section a free-text line appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Lead,
    AfterLyrics,
    Notes,
}

/// Free text of a section, by part.
#[derive(Debug, Default)]
struct FreeText {
    lead: Vec<String>,
    after_lyrics: Vec<String>,
    notes: Option<Vec<String>>,
}

impl FreeText {
    fn push(&mut self, part: Part, line: &str) {
        let bucket = match part {
            Part::Lead => &mut self.lead,
            Part::AfterLyrics => &mut self.after_lyrics,
            Part::Notes => self.notes.get_or_insert_with(Vec::new),
        };
        bucket.push(line.to_string());
    }

    /// The notes block and the lines outside it. A `Notes` label selects
    /// what follows it; otherwise the text after the lyrics block, or all
    /// of it when there is no lyrics block.
    fn split(self, has_lyrics: bool) -> (Vec<String>, Vec<String>) {
        match self.notes {
            Some(notes) => {
                let mut outside = self.lead;
                outside.extend(self.after_lyrics);
                (notes, outside)
            }
            None if has_lyrics => (self.after_lyrics, self.lead),
            None => {
                let mut all = self.lead;
                all.extend(self.after_lyrics);
                (all, Vec::new())
            }
        }
    }
}

/// Lazily splits corpus text into sections and parses each one.
///
/// Pure function of its input: create a new parser to restart.
#[derive(Debug)]
pub struct CorpusParser<'a> {
    lines: Vec<&'a str>,
    cursor: usize,
    next_index: usize,
}

impl<'a> CorpusParser<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            cursor: 0,
            next_index: 0,
        }
    }

    /// Advance to the next non-blank section.
    pub fn next_section(&mut self) -> Option<Section<'a>> {
        loop {
            if self.cursor >= self.lines.len() {
                return None;
            }
            let start = self.cursor;
            let mut body: Vec<&'a str> = Vec::new();
            let mut body_start = start;
            let mut title_level: Option<usize> = None;
            let mut fence: Option<Fence> = None;

            while self.cursor < self.lines.len() {
                let line = self.lines[self.cursor];

                if let Some(open) = fence {
                    body.push(line);
                    self.cursor += 1;
                    if open.closes(line) {
                        fence = None;
                    }
                    continue;
                }
                if let Some(open) = Fence::open(line) {
                    fence = Some(open);
                    body.push(line);
                    self.cursor += 1;
                    continue;
                }

                let has_content = body.iter().any(|l| !l.trim().is_empty());
                match classify(line) {
                    LineKind::Rule | LineKind::DocumentHeading => {
                        self.cursor += 1;
                        if has_content {
                            break;
                        }
                        body.clear();
                        body_start = self.cursor;
                    }
                    LineKind::Anchor => {
                        if has_content {
                            break;
                        }
                        body.push(line);
                        self.cursor += 1;
                    }
                    LineKind::TitleHeading(level) => {
                        if title_level.is_some_and(|title| level <= title) {
                            break;
                        }
                        title_level.get_or_insert(level);
                        body.push(line);
                        self.cursor += 1;
                    }
                    LineKind::Other => {
                        body.push(line);
                        self.cursor += 1;
                    }
                }
            }

            if body.iter().all(|l| l.trim().is_empty()) {
                continue;
            }
            let index = self.next_index;
            self.next_index += 1;
            return Some(Section {
                index,
                start_line: body_start + 1,
                lines: body,
            });
        }
    }
}

impl Iterator for CorpusParser<'_> {
    type Item = Result<RawRecord, ParseSkip>;

    fn next(&mut self) -> Option<Self::Item> {
        let section = self.next_section()?;
        Some(parse_section(&section))
    }
}

/// Parse lazily; each item is a record or the reason its section was skipped.
#[must_use]
pub fn parse(text: &str) -> CorpusParser<'_> {
    CorpusParser::new(text)
}

/// The collected result of parsing a whole corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCorpus {
    pub records: Vec<RawRecord>,
    pub skips: Vec<ParseSkip>,
}

/// Parse a whole corpus, logging and collecting skipped sections.
#[must_use]
pub fn parse_corpus(text: &str) -> ParsedCorpus {
    let mut parsed = ParsedCorpus::default();
    for item in parse(text) {
        match item {
            Ok(record) => parsed.records.push(record),
            Err(skip) => {
                log::warn!("Skipping corpus {}", skip);
                parsed.skips.push(skip);
            }
        }
    }
    parsed
}

/// Extract one record from a section.
pub fn parse_section(section: &Section<'_>) -> Result<RawRecord, ParseSkip> {
    let skip = |reason: &str| ParseSkip {
        section: section.index,
        line: section.start_line,
        reason: reason.to_string(),
    };

    let mut anchor_key: Option<String> = None;
    let mut title_line: Option<String> = None;
    let mut lyrics: Option<Vec<&str>> = None;
    let mut text = FreeText::default();
    let mut part = Part::Lead;
    let mut meta: Vec<(String, String)> = Vec::new();

    let mut fence: Option<Fence> = None;
    // Lines of the block currently being collected as lyrics.
    let mut lyric_lines: Option<Vec<&str>> = None;

    for &raw_line in &section.lines {
        let mut line = raw_line;

        if let Some(open) = fence {
            if open.closes(line) {
                fence = None;
                if let Some(block) = lyric_lines.take() {
                    lyrics = Some(block);
                    if part == Part::Lead {
                        part = Part::AfterLyrics;
                    }
                } else {
                    text.push(part, line);
                }
            } else if let Some(block) = lyric_lines.as_mut() {
                block.push(line);
            } else {
                text.push(part, line);
            }
            continue;
        }

        if let Some(caps) = ANCHOR.captures(line) {
            if anchor_key.is_none() {
                anchor_key = caps.get(1).map(|m| m.as_str().to_string());
            }
            let rest = caps.get(2).map_or("", |m| m.as_str());
            if rest.trim().is_empty() {
                continue;
            }
            line = rest;
        }

        if let Some(open) = Fence::open(line) {
            fence = Some(open);
            if lyrics.is_none() && lyric_lines.is_none() {
                lyric_lines = Some(Vec::new());
            } else {
                text.push(part, line);
            }
            continue;
        }

        if let Some(caps) = META.captures(line) {
            let name = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
            let value = caps.get(2).map_or("", |m| m.as_str()).to_string();
            if matches!(
                name.as_str(),
                "key" | "created" | "updated" | "image" | "audio"
            ) {
                meta.push((name, value));
                continue;
            }
        }

        let heading = HEADING
            .captures(line)
            .map(|caps| caps.get(2).map_or("", |m| m.as_str()));
        let label_text = heading.unwrap_or(line);
        if let Some(inline) = notes_label(label_text) {
            part = Part::Notes;
            if text.notes.is_none() {
                text.notes = Some(Vec::new());
            }
            if !inline.is_empty() {
                text.push(part, &inline);
            }
            continue;
        }
        if LYRICS_LABEL.is_match(label_text) {
            continue;
        }
        if let Some(heading) = heading.filter(|_| title_line.is_none()) {
            title_line = Some(heading.to_string());
            continue;
        }

        text.push(part, line);
    }

    if let Some(block) = lyric_lines {
        log::warn!(
            "Unterminated lyrics fence in section {} (line {}); taking the rest of the section",
            section.index,
            section.start_line
        );
        lyrics = Some(block);
    }

    let Some(raw_title) = title_line else {
        return Err(skip("no title heading"));
    };
    let title = clean_title(&raw_title);
    if title.is_empty() {
        return Err(skip("title is empty after removing decoration"));
    }

    let (notes, outside) = text.split(lyrics.is_some());
    let dropped = outside.iter().filter(|l| !l.trim().is_empty()).count();
    if dropped > 0 {
        log::warn!(
            "Ignoring {} line(s) outside the notes block of {:?} (section {}, line {})",
            dropped,
            title,
            section.index,
            section.start_line
        );
    }

    let mut record = RawRecord::new(title, Source::Corpus);
    record.key_hint = anchor_key;
    record.lyrics = lyrics.map(|l| l.join("\n")).filter(|l| !l.trim().is_empty());

    for (name, value) in meta {
        match name.as_str() {
            "key" if !value.is_empty() => record.key_hint = Some(value),
            "created" => record.created_at = parse_timestamp(&value),
            "updated" => record.updated_at = parse_timestamp(&value),
            "image" if !value.is_empty() => record.image = Some(value),
            "audio" if !value.is_empty() => record.audio = Some(value),
            _ => {}
        }
    }

    let notes_text = trim_blank_lines(&notes.join("\n"));
    if !notes_text.is_empty() {
        let extracted = extract_sounds_like(&notes_text);
        record.sounds_like = extracted.sounds_like;
        let unescaped: Vec<&str> = extracted.notes.lines().map(unescape_notes_line).collect();
        record.notes = Some(unescaped.join("\n")).filter(|n| !n.trim().is_empty());
    }

    Ok(record)
}

/// If `text` is a notes label, return any inline notes content after it.
fn notes_label(text: &str) -> Option<String> {
    NOTES_LABEL.captures(text).map(|caps| {
        caps.get(1)
            .map_or(String::new(), |m| m.as_str().trim().to_string())
    })
}

/// RFC 3339, or a bare `YYYY-MM-DD` date at midnight UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(ts) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Some(ts.and_utc());
    }
    log::warn!("Ignoring unparseable timestamp {value:?}");
    None
}

fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KENTUCKY: &str = r#"# Songbook backup

<a id="kentucky-hills"></a>
## 1. Kentucky Hills

```
Up in the Kentucky hills
where the morning fog spills
```

### Notes
Sounds like: Gillian Welch
Open D tuning, capo 2.

---
"#;

    fn records(text: &str) -> Vec<RawRecord> {
        parse_corpus(text).records
    }

    #[test]
    fn test_kentucky_hills_section() {
        let parsed = parse_corpus(KENTUCKY);
        assert!(parsed.skips.is_empty());
        assert_eq!(parsed.records.len(), 1);

        let song = &parsed.records[0];
        assert_eq!(song.title, "Kentucky Hills");
        assert_eq!(song.key_hint.as_deref(), Some("kentucky-hills"));
        assert_eq!(
            song.lyrics.as_deref(),
            Some("Up in the Kentucky hills\nwhere the morning fog spills")
        );
        assert_eq!(song.notes.as_deref(), Some("Open D tuning, capo 2."));
        assert_eq!(song.sounds_like.as_deref(), Some("Gillian Welch"));
        assert_eq!(song.source, Source::Corpus);
    }

    #[test]
    fn test_sections_keep_corpus_order() {
        let text = "## Zebra\n\n---\n\n## Apple\n\n---\n\n## Mango\n";
        let titles: Vec<String> = records(text).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["Zebra", "Apple", "Mango"]);
    }

    #[test]
    fn test_headings_split_sections_without_rules() {
        let text = "## One\nfirst notes\n## Two\n```\nla\n```\n";
        let parsed = records(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].notes.as_deref(), Some("first notes"));
        assert_eq!(parsed[1].lyrics.as_deref(), Some("la"));
    }

    #[test]
    fn test_anchor_starts_new_section() {
        let text = "<a id=\"one\"></a>\n## One\n<a name='two'></a>\n## Two\n";
        let parsed = records(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].key_hint.as_deref(), Some("two"));
    }

    #[test]
    fn test_section_without_title_is_skipped_and_counted() {
        let text = "## Good\n---\njust some stray text\n---\n## Also Good\n";
        let parsed = parse_corpus(text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skips.len(), 1);
        assert_eq!(parsed.skips[0].section, 1);
        assert_eq!(parsed.skips[0].line, 3);
    }

    #[test]
    fn test_decoration_only_title_is_skipped() {
        let parsed = parse_corpus("## 12.\nnotes\n");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skips.len(), 1);
    }

    #[test]
    fn test_notes_without_heading_follow_lyrics() {
        let text = "## Song\n```\nverse\n```\nremember the bridge\n";
        let song = &records(text)[0];
        assert_eq!(song.lyrics.as_deref(), Some("verse"));
        assert_eq!(song.notes.as_deref(), Some("remember the bridge"));
    }

    #[test]
    fn test_inline_notes_label() {
        let text = "## Song\n**Notes:** written on tour\nsecond line\n";
        let song = &records(text)[0];
        assert_eq!(song.notes.as_deref(), Some("written on tour\nsecond line"));
    }

    #[test]
    fn test_rule_and_headings_inside_fence_do_not_split() {
        let text = "## Song\n```\nverse one\n---\n## not a heading\n```\n";
        let parsed = records(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(
            parsed[0].lyrics.as_deref(),
            Some("verse one\n---\n## not a heading")
        );
    }

    #[test]
    fn test_second_fence_stays_in_notes() {
        let text = "## Song\n```\nlyrics\n```\n### Notes\n~~~\nG C D\n~~~\n";
        let song = &records(text)[0];
        assert_eq!(song.lyrics.as_deref(), Some("lyrics"));
        assert_eq!(song.notes.as_deref(), Some("~~~\nG C D\n~~~"));
    }

    #[test]
    fn test_unterminated_fence_takes_rest_of_section() {
        let song = &records("## Song\n```\nline one\nline two\n")[0];
        assert_eq!(song.lyrics.as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn test_metadata_comments() {
        let text = "## Song\n<!-- key: old-key -->\n<!-- updated: 2024-05-02T10:00:00Z -->\n<!-- created: 2024-01-01 -->\n<!-- image: blob://img/1 -->\n<!-- private: keep me -->\n";
        let song = &records(text)[0];
        assert_eq!(song.key_hint.as_deref(), Some("old-key"));
        assert_eq!(
            song.updated_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap())
        );
        assert_eq!(
            song.created_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(song.image.as_deref(), Some("blob://img/1"));
        assert_eq!(song.notes.as_deref(), Some("<!-- private: keep me -->"));
    }

    #[test]
    fn test_document_heading_is_not_a_title() {
        let parsed = parse_corpus("# My Songs\n\n## Only Song\n");
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.skips.is_empty());
    }

    #[test]
    fn test_sub_headings_stay_with_their_section() {
        let text = "## Song\n### Lyrics\n```\nla\n```\n### Chords\nG C\n";
        let parsed = records(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].notes.as_deref(), Some("### Chords\nG C"));
    }

    #[test]
    fn test_parser_is_restartable() {
        let first: Vec<_> = parse(KENTUCKY).collect();
        let second: Vec<_> = parse(KENTUCKY).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_corpus() {
        let parsed = parse_corpus("\n\n---\n\n");
        assert!(parsed.records.is_empty());
        assert!(parsed.skips.is_empty());
    }

    #[test]
    fn test_notes_heading_selects_notes_block() {
        let text = "## Song\nIntro chatter\n```\nla\n```\nChords: G C D\n### Notes\nreal notes\n";
        let song = &records(text)[0];
        assert_eq!(song.lyrics.as_deref(), Some("la"));
        assert_eq!(song.notes.as_deref(), Some("real notes"));
    }

    #[test]
    fn test_text_before_lyrics_is_not_notes() {
        let text = "## Song\nIntro chatter\n```\nla\n```\nafter the verse\n";
        let song = &records(text)[0];
        assert_eq!(song.notes.as_deref(), Some("after the verse"));
    }

    #[test]
    fn test_notes_heading_before_lyrics() {
        let text = "## Song\n### Notes\nwritten in March\n### Lyrics\n```\nla\n```\n";
        let song = &records(text)[0];
        assert_eq!(song.lyrics.as_deref(), Some("la"));
        assert_eq!(song.notes.as_deref(), Some("written in March"));
    }

    #[test]
    fn test_version_comment_stays_in_notes() {
        let song = &records("## Song\n<!-- version: 3 -->\n")[0];
        assert_eq!(song.notes.as_deref(), Some("<!-- version: 3 -->"));
    }

    #[test]
    fn test_escaped_structure_in_notes() {
        let text = "## Song\n### Notes\nidea A\n\\---\n\\## Bridge\n\\Sounds like: nobody\n---\n## Next\n";
        let parsed = records(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed[0].notes.as_deref(),
            Some("idea A\n---\n## Bridge\nSounds like: nobody")
        );
        assert!(parsed[0].sounds_like.is_none());
    }

    #[test]
    fn test_escape_round_trips() {
        for line in [
            "plain text",
            "---",
            "## Bridge",
            "<a id=\"x\"></a>",
            "```",
            "<!-- key: other -->",
            "Notes: more",
            "Sounds like: Prine",
            "\\already escaped",
            "\\\\server\\share",
        ] {
            let escaped = escape_notes_line(line);
            assert_eq!(unescape_notes_line(&escaped), line, "round trip of {line:?}");
        }
        assert_eq!(escape_notes_line("plain text"), "plain text");
        assert_eq!(escape_notes_line("---"), "\\---");
    }
}
