//! One end-to-end migration pass.
//!
//! `Idle → Parsing → Normalizing → Deduplicating → Merging → BackingUp →
//! Writing → Reporting → Done`, with `Failed` reachable from every step.
//! The store hold is taken at `Idle` and released on every exit path. No
//! write happens unless a backup of the pre-pass state was taken first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use songbook_core::{Candidate, FieldOverride, SongCatalog, SongKey, Source, StorageAdapter, StoreSnapshot};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dedup::{deduplicate, precedence_order};
use crate::error::{MigrationError, MigrationResult};
use crate::merge::{merge_sources, MergeClass};
use crate::normalize::normalize_batch;
use crate::report::MigrationReport;
use crate::sources::{overrides_to_records, Input, SourceBatch};
use crate::tombstone::TombstoneTracker;

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PassState {
    Idle,
    Parsing,
    Normalizing,
    Deduplicating,
    Merging,
    BackingUp,
    Writing,
    Reporting,
    Done,
    Failed,
}

impl PassState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Parsing => "parsing",
            Self::Normalizing => "normalizing",
            Self::Deduplicating => "deduplicating",
            Self::Merging => "merging",
            Self::BackingUp => "backingUp",
            Self::Writing => "writing",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared flag for aborting a pass from another thread. Honored up to
/// and including `BackingUp`; once `Writing` starts the pass completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-pass switches.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Stop after merging: report, but never back up or write.
    pub dry_run: bool,
    /// Delete legacy field overrides whose value is now stored.
    pub clear_applied_overrides: bool,
    pub cancel: CancelToken,
}

impl MigrationOptions {
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_clear_applied_overrides(mut self, clear: bool) -> Self {
        self.clear_applied_overrides = clear;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Drives one pass against one store.
#[derive(Debug)]
pub struct MigrationPass<'a> {
    store: &'a mut dyn StorageAdapter,
    options: MigrationOptions,
    state: PassState,
    trace: Vec<PassState>,
}

impl<'a> MigrationPass<'a> {
    pub fn new(store: &'a mut dyn StorageAdapter, options: MigrationOptions) -> Self {
        Self {
            store,
            options,
            state: PassState::Idle,
            trace: vec![PassState::Idle],
        }
    }

    #[must_use]
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn trace(&self) -> &[PassState] {
        &self.trace
    }

    /// Run the pass stamped with the current time.
    pub fn run(&mut self, inputs: &[Input]) -> MigrationResult<MigrationReport> {
        self.run_at(inputs, Utc::now())
    }

    /// Run the pass with an explicit pass timestamp.
    pub fn run_at(
        &mut self,
        inputs: &[Input],
        now: DateTime<Utc>,
    ) -> MigrationResult<MigrationReport> {
        self.state = PassState::Idle;
        self.trace = vec![PassState::Idle];
        log::info!(
            "Starting migration pass on {} ({} inputs{})",
            self.store.describe(),
            inputs.len(),
            if self.options.dry_run { ", dry run" } else { "" }
        );

        match self.execute(inputs, now) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.enter(PassState::Failed);
                log::error!("Migration pass failed: {}", e);
                Err(e)
            }
        }
    }

    fn enter(&mut self, state: PassState) {
        log::info!("Pass state: {} -> {}", self.state, state);
        self.state = state;
        self.trace.push(state);
    }

    fn checkpoint(&self) -> MigrationResult<()> {
        if self.options.cancel.is_cancelled() {
            log::warn!("Pass cancelled during {}", self.state);
            return Err(MigrationError::Cancelled);
        }
        Ok(())
    }

    fn execute(&mut self, inputs: &[Input], now: DateTime<Utc>) -> MigrationResult<MigrationReport> {
        let _hold = self.store.hold().map_err(MigrationError::StoreUnavailable)?;
        let snapshot = self
            .store
            .snapshot(now)
            .map_err(MigrationError::StoreUnavailable)?;
        let overrides = self
            .store
            .read_field_overrides()
            .map_err(MigrationError::StoreUnavailable)?;
        let tombstones = TombstoneTracker::from(snapshot.tombstones().to_vec());
        let mut report = MigrationReport::new(now, self.options.dry_run);
        self.checkpoint()?;

        self.enter(PassState::Parsing);
        let mut batches = inputs
            .iter()
            .map(Input::load)
            .collect::<MigrationResult<Vec<SourceBatch>>>()?;
        if !overrides.is_empty() {
            batches.push(SourceBatch {
                source: Source::FieldOverride,
                label: "field overrides".to_string(),
                records: overrides_to_records(&overrides),
                skips: Vec::new(),
            });
        }
        for batch in &mut batches {
            report.skips.append(&mut batch.skips);
        }
        report.parse_skips = report.skips.len();
        self.checkpoint()?;

        self.enter(PassState::Normalizing);
        let normalized: Vec<Vec<Candidate>> = batches
            .into_iter()
            .map(|batch| {
                let normalized = normalize_batch(batch.records);
                log::debug!("{}: {}", batch.label, normalized);
                report.validation_errors += normalized.errors.len();
                normalized.candidates
            })
            .collect();
        self.checkpoint()?;

        self.enter(PassState::Deduplicating);
        let mut candidates = Vec::new();
        for group in normalized {
            let deduped = deduplicate(group);
            report.duplicates_collapsed += deduped.collapsed;
            candidates.extend(deduped.candidates);
        }
        self.checkpoint()?;

        self.enter(PassState::Merging);
        let merged = merge_into_snapshot(&snapshot, candidates, &tombstones, now, &mut report);
        self.checkpoint()?;

        if self.options.dry_run {
            self.enter(PassState::Reporting);
            log::info!("Dry run complete; nothing written");
            self.enter(PassState::Done);
            return Ok(report);
        }

        self.enter(PassState::BackingUp);
        self.checkpoint()?;
        if report.has_changes() {
            let label = format!("pre-migrate-{}", now.format("%Y%m%dT%H%M%SZ"));
            let backup = self
                .store
                .backup(&snapshot, &label)
                .map_err(MigrationError::BackupFailure)?;
            log::info!("Backed up {} songs to {}", snapshot.songs().len(), backup);
            report.backup = Some(backup);
        } else {
            log::info!("No effective changes; skipping backup and write");
        }

        self.enter(PassState::Writing);
        if let Some(backup) = &report.backup {
            self.store
                .write_all(&merged)
                .map_err(|source| MigrationError::WriteFailure {
                    backup: backup.clone(),
                    source,
                })?;
            log::info!("Wrote {} songs", merged.len());
        }
        if self.options.clear_applied_overrides {
            let stored = if report.backup.is_some() {
                &merged
            } else {
                snapshot.songs()
            };
            report.overrides_cleared = self.clear_applied_overrides(&overrides, stored);
        }

        self.enter(PassState::Reporting);
        log::info!(
            "Pass {}: {} added, {} fields restored, {} duplicates collapsed, {} conflicts, {} tombstoned, {} parse skips",
            report.pass_id,
            report.added,
            report.fields_restored,
            report.duplicates_collapsed,
            report.conflicts_resolved,
            report.skipped_tombstoned,
            report.parse_skips
        );
        self.enter(PassState::Done);
        Ok(report)
    }

    /// Remove overrides whose value is now the stored value. Failures are
    /// logged and leave the override in place.
    fn clear_applied_overrides(&mut self, overrides: &[FieldOverride], stored: &SongCatalog) -> usize {
        let mut cleared = 0;
        for ov in overrides {
            let applied = stored
                .get(ov.key.as_str())
                .and_then(|record| record.field(ov.field))
                .is_some_and(|value| value.trim() == ov.value.trim());
            if !applied {
                continue;
            }
            match self.store.delete_field(&ov.key, ov.field) {
                Ok(()) => cleared += 1,
                Err(e) => log::warn!("Failed to clear override {}.{}: {}", ov.key, ov.field, e),
            }
        }
        cleared
    }
}

/// Merge deduplicated candidates against the snapshot, producing the
/// complete new store state.
///
/// Existing records keep their position and new records are appended in
/// first-seen order. Candidates for the same key from different sources
/// are merged together in precedence order and count as collapsed
/// duplicates. Live records whose key is
/// tombstoned are dropped.
pub fn merge_into_snapshot(
    snapshot: &StoreSnapshot,
    candidates: Vec<Candidate>,
    tombstones: &TombstoneTracker,
    now: DateTime<Utc>,
    report: &mut MigrationReport,
) -> SongCatalog {
    let mut groups: Vec<(SongKey, Vec<Candidate>)> = Vec::new();
    let mut index: HashMap<SongKey, usize> = HashMap::new();
    for candidate in candidates {
        if let Some(&pos) = index.get(&candidate.key) {
            groups[pos].1.push(candidate);
        } else {
            index.insert(candidate.key.clone(), groups.len());
            groups.push((candidate.key.clone(), vec![candidate]));
        }
    }

    let mut merged = SongCatalog::new();
    for record in snapshot.songs() {
        if tombstones.is_tombstoned(record.key.as_str()) {
            log::warn!("Dropping live record {}: key is tombstoned", record.key);
            report.tombstoned_purged += 1;
            continue;
        }
        merged.upsert(record.clone());
    }

    for (key, group) in groups {
        let ordered = precedence_order(group);
        if ordered.len() > 1 {
            log::debug!("{}: folding {} candidates from different sources", key, ordered.len());
            report.duplicates_collapsed += ordered.len() - 1;
        }
        let existing = snapshot.songs().get(key.as_str());
        let outcome = merge_sources(&key, existing, &ordered, tombstones, now);
        report.record(&outcome);
        if outcome.class == MergeClass::SkippedTombstoned {
            continue;
        }
        if let Some(record) = outcome.record {
            merged.upsert(record);
        }
    }
    merged
}
