//! The result of one migration pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use songbook_core::BackupLocation;
use std::fmt;
use uuid::Uuid;

use crate::corpus::ParseSkip;
use crate::merge::{MergeClass, MergeOutcome};

/// Counts and details of one pass, returned to the caller. Nothing here is
/// shared between passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,

    /// Records created.
    pub added: usize,
    /// Optional fields adopted into existing records.
    pub fields_restored: usize,
    /// Existing records whose only change was a restored title.
    pub updated: usize,
    pub unchanged: usize,
    /// Candidates folded into another candidate for the same key, whether
    /// both came from one source or from different ones.
    pub duplicates_collapsed: usize,
    pub conflicts_resolved: usize,
    pub skipped_tombstoned: usize,
    pub parse_skips: usize,
    pub validation_errors: usize,
    /// Live store records dropped because their key is tombstoned.
    pub tombstoned_purged: usize,
    pub overrides_cleared: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupLocation>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<ParseSkip>,
}

impl MigrationReport {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            started_at,
            dry_run,
            added: 0,
            fields_restored: 0,
            updated: 0,
            unchanged: 0,
            duplicates_collapsed: 0,
            conflicts_resolved: 0,
            skipped_tombstoned: 0,
            parse_skips: 0,
            validation_errors: 0,
            tombstoned_purged: 0,
            overrides_cleared: 0,
            backup: None,
            skips: Vec::new(),
        }
    }

    /// Tally one merge outcome.
    pub fn record(&mut self, outcome: &MergeOutcome) {
        self.conflicts_resolved += outcome.conflicts;
        match outcome.class {
            MergeClass::Created => self.added += 1,
            MergeClass::FieldRestored => self.fields_restored += outcome.adopted.len(),
            MergeClass::Updated => self.updated += 1,
            MergeClass::Unchanged => self.unchanged += 1,
            MergeClass::SkippedTombstoned => self.skipped_tombstoned += 1,
        }
    }

    /// Whether the pass changes the stored state.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.added + self.fields_restored + self.updated + self.tombstoned_purged > 0
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = if self.dry_run {
            "Migration pass (dry run)"
        } else {
            "Migration pass"
        };
        writeln!(f, "{heading} {}", self.pass_id)?;
        writeln!(f, "  Added:                {}", self.added)?;
        writeln!(f, "  Fields restored:      {}", self.fields_restored)?;
        writeln!(f, "  Titles restored:      {}", self.updated)?;
        writeln!(f, "  Unchanged:            {}", self.unchanged)?;
        writeln!(f, "  Duplicates collapsed: {}", self.duplicates_collapsed)?;
        writeln!(f, "  Conflicts resolved:   {}", self.conflicts_resolved)?;
        writeln!(f, "  Skipped (tombstoned): {}", self.skipped_tombstoned)?;
        writeln!(f, "  Tombstoned purged:    {}", self.tombstoned_purged)?;
        writeln!(f, "  Parse skips:          {}", self.parse_skips)?;
        writeln!(f, "  Validation errors:    {}", self.validation_errors)?;
        if self.overrides_cleared > 0 {
            writeln!(f, "  Overrides cleared:    {}", self.overrides_cleared)?;
        }
        match &self.backup {
            Some(backup) => write!(f, "  Backup:               {backup}"),
            None => write!(f, "  Backup:               none"),
        }
    }
}
