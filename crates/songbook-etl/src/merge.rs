//! Record merging against the store.
//!
//! The existing store record is authoritative. A candidate may only fill
//! fields that are empty in the store, and may only replace a title that
//! no human ever set. Every source goes through the same rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use songbook_core::{Candidate, SongField, SongKey, SongRecord};
use std::fmt;

use crate::tombstone::TombstoneTracker;

/// How a merge changed a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeClass {
    /// No store record existed; a version-1 record was created.
    Created,
    /// Only the title was restored.
    Updated,
    /// At least one optional field was adopted.
    FieldRestored,
    Unchanged,
    /// The key is tombstoned; nothing was merged.
    SkippedTombstoned,
}

impl MergeClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::FieldRestored => "fieldRestored",
            Self::Unchanged => "unchanged",
            Self::SkippedTombstoned => "skippedTombstoned",
        }
    }

    /// Whether the store must be written for this outcome.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::FieldRestored)
    }
}

impl fmt::Display for MergeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of merging one key.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub key: SongKey,
    /// The record to keep. `None` only when a tombstoned key had no store
    /// record.
    pub record: Option<SongRecord>,
    pub class: MergeClass,
    /// Optional fields adopted into an existing record.
    pub adopted: Vec<SongField>,
    pub title_restored: bool,
    /// Fields where both sides held different non-empty values; the
    /// existing value was kept.
    pub conflicts: usize,
}

/// Merge one candidate into the existing record for its key.
pub fn merge(
    existing: Option<&SongRecord>,
    candidate: &Candidate,
    tombstones: &TombstoneTracker,
    now: DateTime<Utc>,
) -> MergeOutcome {
    merge_sources(
        &candidate.key,
        existing,
        std::iter::once(candidate),
        tombstones,
        now,
    )
}

/// Merge several candidates for the same key, in precedence order.
///
/// Earlier candidates get the first claim on empty fields. The result is
/// one mutation at most: however many candidates contribute, the version
/// moves by exactly one.
pub fn merge_sources<'a>(
    key: &SongKey,
    existing: Option<&SongRecord>,
    candidates: impl IntoIterator<Item = &'a Candidate>,
    tombstones: &TombstoneTracker,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        key: key.clone(),
        record: existing.cloned(),
        class: MergeClass::Unchanged,
        adopted: Vec::new(),
        title_restored: false,
        conflicts: 0,
    };

    if tombstones.is_tombstoned(key.as_str()) {
        log::debug!("{}: tombstoned, merge skipped", key);
        outcome.class = MergeClass::SkippedTombstoned;
        return outcome;
    }

    let mut candidates = candidates.into_iter();
    let mut record = match existing {
        Some(record) => record.clone(),
        None => {
            let Some(first) = candidates.next() else {
                return outcome;
            };
            let mut record = SongRecord::new(key.clone(), first.title.trim(), now);
            absorb(&mut record, first, &mut Vec::new(), &mut 0);
            record
        }
    };

    for candidate in candidates {
        if !record.has_human_title() && has_human_title(candidate) {
            record.title = candidate.title.trim().to_string();
            outcome.title_restored = true;
        }
        absorb(&mut record, candidate, &mut outcome.adopted, &mut outcome.conflicts);
    }

    outcome.class = match existing {
        None => MergeClass::Created,
        Some(_) if !outcome.adopted.is_empty() => MergeClass::FieldRestored,
        Some(_) if outcome.title_restored => MergeClass::Updated,
        Some(_) => MergeClass::Unchanged,
    };

    if let Some(previous) = existing {
        if outcome.class.is_mutation() {
            record.version = previous.version + 1;
            record.updated_at = now.max(record.created_at);
        }
    }

    log::debug!(
        "{}: {} ({} adopted, {} conflicts)",
        key,
        outcome.class,
        outcome.adopted.len(),
        outcome.conflicts
    );
    outcome.record = Some(record);
    outcome
}

fn has_human_title(candidate: &Candidate) -> bool {
    let title = candidate.title.trim();
    !title.is_empty() && title != candidate.key.as_str()
}

/// Fill the record's empty optional fields from the candidate.
fn absorb(
    record: &mut SongRecord,
    candidate: &Candidate,
    adopted: &mut Vec<SongField>,
    conflicts: &mut usize,
) {
    for field in SongField::OPTIONAL {
        match (record.field(field), candidate.field(field)) {
            (None, Some(incoming)) => {
                let incoming = incoming.to_string();
                record.set_field(field, incoming);
                adopted.push(field);
            }
            (Some(current), Some(incoming)) if current != incoming => {
                log::debug!(
                    "{}: kept existing {} over {} value",
                    record.key,
                    field,
                    candidate.source
                );
                *conflicts += 1;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use songbook_core::Source;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
    }

    fn key(s: &str) -> SongKey {
        SongKey::from_stored(s)
    }

    fn stored(k: &str) -> SongRecord {
        let mut record = SongRecord::new(key(k), "Stored Title", at(1));
        record.version = 3;
        record
    }

    fn cand(k: &str) -> Candidate {
        Candidate::new(key(k), "Incoming Title", Source::Corpus)
    }

    #[test]
    fn test_created_when_no_existing_record() {
        let candidate = cand("x").with_field(SongField::Lyrics, "L");
        let outcome = merge(None, &candidate, &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::Created);
        let record = outcome.record.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.created_at, at(10));
        assert_eq!(record.updated_at, at(10));
        assert_eq!(record.lyrics.as_deref(), Some("L"));
        assert_eq!(record.title, "Incoming Title");
    }

    #[test]
    fn test_field_restored_scenario() {
        let existing = stored("x").with_lyrics("L1").with_notes("");
        let candidate = cand("x")
            .with_field(SongField::Lyrics, "L2")
            .with_field(SongField::Notes, "N2");
        let outcome = merge(Some(&existing), &candidate, &TombstoneTracker::new(), at(10));

        assert_eq!(outcome.class, MergeClass::FieldRestored);
        assert_eq!(outcome.adopted, vec![SongField::Notes]);
        assert_eq!(outcome.conflicts, 1);
        let record = outcome.record.unwrap();
        assert_eq!(record.lyrics.as_deref(), Some("L1"));
        assert_eq!(record.notes.as_deref(), Some("N2"));
        assert_eq!(record.version, 4);
        assert_eq!(record.updated_at, at(10));
        assert_eq!(record.created_at, at(1));
    }

    #[test]
    fn test_never_overwrites_non_empty_field() {
        for field in SongField::OPTIONAL {
            let mut existing = stored("x");
            existing.set_field(field, "keep");
            let candidate = cand("x").with_field(field, "clobber");
            let outcome = merge(Some(&existing), &candidate, &TombstoneTracker::new(), at(10));
            let record = outcome.record.unwrap();
            assert_eq!(record.field(field), Some("keep"), "field {field}");
            assert_eq!(outcome.class, MergeClass::Unchanged, "field {field}");
            assert_eq!(record.version, 3);
        }
    }

    #[test]
    fn test_each_empty_field_is_restored() {
        for field in SongField::OPTIONAL {
            let candidate = cand("x").with_field(field, "value");
            let outcome = merge(Some(&stored("x")), &candidate, &TombstoneTracker::new(), at(10));
            assert_eq!(outcome.class, MergeClass::FieldRestored, "field {field}");
            assert_eq!(outcome.record.unwrap().field(field), Some("value"));
        }
    }

    #[test]
    fn test_unchanged_keeps_version_and_timestamp() {
        let existing = stored("x").with_lyrics("L");
        let candidate = cand("x").with_field(SongField::Lyrics, "L");
        let outcome = merge(Some(&existing), &candidate, &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::Unchanged);
        assert_eq!(outcome.conflicts, 0);
        assert_eq!(outcome.record.as_ref(), Some(&existing));
    }

    #[test]
    fn test_title_restored_only_when_never_set() {
        let mut keyed = stored("x");
        keyed.title = "x".to_string();
        let outcome = merge(Some(&keyed), &cand("x"), &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::Updated);
        assert!(outcome.title_restored);
        let record = outcome.record.unwrap();
        assert_eq!(record.title, "Incoming Title");
        assert_eq!(record.version, 4);

        let outcome = merge(Some(&stored("x")), &cand("x"), &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::Unchanged);
        assert_eq!(outcome.record.unwrap().title, "Stored Title");
    }

    #[test]
    fn test_key_title_never_replaces_human_title() {
        let mut keyed = stored("x");
        keyed.title = String::new();
        let candidate = Candidate::new(key("x"), "x", Source::FieldOverride);
        let outcome = merge(Some(&keyed), &candidate, &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::Unchanged);
    }

    #[test]
    fn test_tombstoned_key_is_skipped() {
        let mut tombstones = TombstoneTracker::new();
        tombstones.record(key("x"), at(5));
        let candidate = cand("x").with_field(SongField::Lyrics, "L");

        let outcome = merge(None, &candidate, &tombstones, at(6));
        assert_eq!(outcome.class, MergeClass::SkippedTombstoned);
        assert!(outcome.record.is_none());

        let existing = stored("x");
        let outcome = merge(Some(&existing), &candidate, &tombstones, at(6));
        assert_eq!(outcome.class, MergeClass::SkippedTombstoned);
        assert_eq!(outcome.record, Some(existing));
    }

    #[test]
    fn test_multiple_sources_bump_version_once() {
        let existing = stored("x");
        let a = cand("x").with_field(SongField::Lyrics, "L");
        let b = Candidate::new(key("x"), "x", Source::FieldOverride)
            .with_field(SongField::Notes, "N")
            .with_field(SongField::Lyrics, "other");
        let outcome = merge_sources(&key("x"), Some(&existing), [&a, &b], &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::FieldRestored);
        assert_eq!(outcome.adopted, vec![SongField::Lyrics, SongField::Notes]);
        assert_eq!(outcome.conflicts, 1);
        assert_eq!(outcome.record.unwrap().version, 4);
    }

    #[test]
    fn test_created_from_multiple_sources_is_version_one() {
        let a = Candidate::new(key("x"), "x", Source::FieldOverride).with_field(SongField::Notes, "N");
        let b = cand("x").with_field(SongField::Lyrics, "L");
        let outcome = merge_sources(&key("x"), None, [&a, &b], &TombstoneTracker::new(), at(10));
        assert_eq!(outcome.class, MergeClass::Created);
        let record = outcome.record.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.title, "Incoming Title");
        assert_eq!(record.notes.as_deref(), Some("N"));
        assert_eq!(record.lyrics.as_deref(), Some("L"));
    }

    #[test]
    fn test_updated_at_never_precedes_created_at() {
        let mut existing = stored("x");
        existing.created_at = at(20);
        existing.updated_at = at(20);
        let candidate = cand("x").with_field(SongField::Audio, "a.mp3");
        let outcome = merge(Some(&existing), &candidate, &TombstoneTracker::new(), at(10));
        let record = outcome.record.unwrap();
        assert!(record.updated_at >= record.created_at);
    }
}
