//! End-to-end migration passes against real stores.

use chrono::{DateTime, TimeZone, Utc};
use songbook_core::store::hold::lock_path_for;
use songbook_core::{
    BackupInfo, BackupLocation, FieldOverride, JsonFileStore, SongCatalog, SongField, SongKey,
    SongRecord, SqliteStore, StorageAdapter, StoreHold, StoreSnapshot, Tombstone,
};
use songbook_etl::ops::delete_song;
use songbook_etl::{
    render_corpus, CancelToken, Input, MigrationError, MigrationOptions, MigrationPass, PassState,
};
use tempfile::TempDir;

const KENTUCKY: &str = r#"# Songbook backup

<a id="kentucky-hills"></a>
## 1. Kentucky Hills

```
Up in the hills
where the river runs
```

### Notes
Sounds like: Gillian Welch
Open D tuning, capo 2.

---
"#;

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
}

fn corpus(text: &str) -> Vec<Input> {
    vec![Input::corpus_text("corpus.md", text)]
}

fn seed(store: &mut dyn StorageAdapter, records: Vec<SongRecord>) {
    let songs: SongCatalog = records.into_iter().collect();
    store.write_all(&songs).unwrap();
}

/// Delegates to an in-memory store, failing on request.
#[derive(Debug)]
struct FlakyStore {
    inner: SqliteStore,
    fail_backup: bool,
    fail_write: bool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_backup: false,
            fail_write: false,
        }
    }
}

impl StorageAdapter for FlakyStore {
    fn describe(&self) -> String {
        format!("flaky {}", self.inner.describe())
    }

    fn hold(&self) -> songbook_core::Result<StoreHold> {
        self.inner.hold()
    }

    fn read_all(&self) -> songbook_core::Result<SongCatalog> {
        self.inner.read_all()
    }

    fn read_tombstones(&self) -> songbook_core::Result<Vec<Tombstone>> {
        self.inner.read_tombstones()
    }

    fn read_field_overrides(&self) -> songbook_core::Result<Vec<FieldOverride>> {
        self.inner.read_field_overrides()
    }

    fn write_all(&mut self, songs: &SongCatalog) -> songbook_core::Result<()> {
        if self.fail_write {
            return Err(songbook_core::Error::InvalidData("disk full".to_string()));
        }
        self.inner.write_all(songs)
    }

    fn write_tombstones(&mut self, tombstones: &[Tombstone]) -> songbook_core::Result<()> {
        self.inner.write_tombstones(tombstones)
    }

    fn backup(
        &mut self,
        snapshot: &StoreSnapshot,
        label: &str,
    ) -> songbook_core::Result<BackupLocation> {
        if self.fail_backup {
            return Err(songbook_core::Error::InvalidData("backup volume gone".to_string()));
        }
        self.inner.backup(snapshot, label)
    }

    fn list_backups(&self) -> songbook_core::Result<Vec<BackupInfo>> {
        self.inner.list_backups()
    }

    fn read_backup(&self, id: &str) -> songbook_core::Result<StoreSnapshot> {
        self.inner.read_backup(id)
    }

    fn delete_field(&mut self, key: &SongKey, field: SongField) -> songbook_core::Result<()> {
        self.inner.delete_field(key, field)
    }
}

#[test]
fn test_kentucky_hills_pass() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut pass = MigrationPass::new(&mut store, MigrationOptions::default());
    let report = pass.run_at(&corpus(KENTUCKY), at(1)).unwrap();

    assert_eq!(
        pass.trace(),
        &[
            PassState::Idle,
            PassState::Parsing,
            PassState::Normalizing,
            PassState::Deduplicating,
            PassState::Merging,
            PassState::BackingUp,
            PassState::Writing,
            PassState::Reporting,
            PassState::Done,
        ]
    );
    assert_eq!(report.added, 1);
    assert_eq!(report.parse_skips, 0);
    assert!(report.backup.is_some());

    let songs = store.read_all().unwrap();
    let song = songs.get("kentucky-hills").unwrap();
    assert_eq!(song.title, "Kentucky Hills");
    assert_eq!(song.lyrics.as_deref(), Some("Up in the hills\nwhere the river runs"));
    assert_eq!(song.notes.as_deref(), Some("Open D tuning, capo 2."));
    assert_eq!(song.sounds_like.as_deref(), Some("Gillian Welch"));
    assert_eq!(song.version, 1);
    assert_eq!(song.created_at, at(1));
}

#[test]
fn test_second_pass_is_a_no_op() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(1))
        .unwrap();
    let after_first = store.read_all().unwrap();

    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(2))
        .unwrap();
    assert!(!report.has_changes());
    assert_eq!(report.unchanged, 1);
    assert!(report.backup.is_none());
    assert_eq!(store.read_all().unwrap(), after_first);
    assert_eq!(store.list_backups().unwrap().len(), 1);
}

#[test]
fn test_field_restored_against_store() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let existing = SongRecord::new(SongKey::from_stored("x"), "X", at(1))
        .with_lyrics("L1")
        .with_notes("");
    seed(&mut store, vec![existing]);

    let text = "## X\n\n```\nL2\n```\n\n### Notes\nN2\n";
    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(text), at(2))
        .unwrap();

    assert_eq!(report.fields_restored, 1);
    assert_eq!(report.conflicts_resolved, 1);
    let song = store.read_all().unwrap().get("x").unwrap().clone();
    assert_eq!(song.lyrics.as_deref(), Some("L1"));
    assert_eq!(song.notes.as_deref(), Some("N2"));
    assert_eq!(song.version, 2);
    assert_eq!(song.updated_at, at(2));
    assert_eq!(song.created_at, at(1));
}

#[test]
fn test_duplicates_collapse_to_latest() {
    let text = "\
## Same Song
<!-- updated: 2024-05-01T00:00:00Z -->
```
old words
```
---
## Same Song
<!-- updated: 2024-05-03T00:00:00Z -->
```
new words
```
";
    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(text), at(4))
        .unwrap();
    assert_eq!(report.duplicates_collapsed, 1);
    assert_eq!(report.added, 1);
    let songs = store.read_all().unwrap();
    assert_eq!(songs.get("same-song").unwrap().lyrics.as_deref(), Some("new words"));
}

#[test]
fn test_tombstoned_key_is_not_resurrected() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(1))
        .unwrap();
    delete_song(&mut store, "kentucky-hills", at(2)).unwrap();

    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(3))
        .unwrap();
    assert_eq!(report.skipped_tombstoned, 1);
    assert_eq!(report.added, 0);
    assert!(!store.read_all().unwrap().contains("kentucky-hills"));
}

#[test]
fn test_live_tombstoned_record_is_purged() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    seed(
        &mut store,
        vec![SongRecord::new(SongKey::from_stored("ghost"), "Ghost", at(1)).with_lyrics("boo")],
    );
    store
        .write_tombstones(&[Tombstone::new(SongKey::from_stored("ghost"), at(2))])
        .unwrap();

    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(""), at(3))
        .unwrap();
    assert_eq!(report.tombstoned_purged, 1);
    assert!(store.read_all().unwrap().is_empty());

    let backup = report.backup.unwrap();
    let snapshot = store.read_backup(&backup.id).unwrap();
    assert!(snapshot.songs().contains("ghost"));
}

#[test]
fn test_backup_failure_leaves_store_untouched() {
    let mut store = FlakyStore::new();
    store.fail_backup = true;

    let mut pass = MigrationPass::new(&mut store, MigrationOptions::default());
    let err = pass.run_at(&corpus(KENTUCKY), at(1)).unwrap_err();
    assert!(matches!(err, MigrationError::BackupFailure(_)));
    assert!(err.is_fatal_before_write());
    assert_eq!(pass.state(), PassState::Failed);
    assert!(!pass.trace().contains(&PassState::Writing));
    assert!(store.read_all().unwrap().is_empty());
}

#[test]
fn test_write_failure_reports_backup() {
    let mut store = FlakyStore::new();
    seed(
        &mut store.inner,
        vec![SongRecord::new(SongKey::from_stored("kentucky-hills"), "Kentucky Hills", at(1))],
    );
    store.fail_write = true;

    let err = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(2))
        .unwrap_err();
    let backup = err.backup().cloned().unwrap();
    let snapshot = store.read_backup(&backup.id).unwrap();
    assert_eq!(snapshot.songs().len(), 1);
    assert!(snapshot.songs().get("kentucky-hills").unwrap().lyrics.is_none());
}

#[test]
fn test_held_store_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("songs.json");
    std::fs::write(lock_path_for(&path), "12345").unwrap();

    let mut store = JsonFileStore::new(&path);
    let mut pass = MigrationPass::new(&mut store, MigrationOptions::default());
    let err = pass.run_at(&corpus(KENTUCKY), at(1)).unwrap_err();
    assert!(matches!(err, MigrationError::StoreUnavailable(_)));
    assert_eq!(pass.trace(), &[PassState::Idle, PassState::Failed]);
    assert!(!path.exists());
}

#[test]
fn test_hold_is_released_after_failure() {
    let mut store = FlakyStore::new();
    store.fail_backup = true;
    assert!(MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(1))
        .is_err());

    store.fail_backup = false;
    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(1))
        .unwrap();
    assert_eq!(report.added, 1);
}

#[test]
fn test_unreadable_corpus_fails_pass() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut pass = MigrationPass::new(&mut store, MigrationOptions::default());
    let err = pass
        .run_at(&[Input::corpus_file("/no/such/corpus.md")], at(1))
        .unwrap_err();
    assert!(matches!(err, MigrationError::CorpusRead { .. }));
    assert_eq!(
        pass.trace(),
        &[PassState::Idle, PassState::Parsing, PassState::Failed]
    );
    assert!(store.list_backups().unwrap().is_empty());
}

#[test]
fn test_dry_run_writes_nothing() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let options = MigrationOptions::default().with_dry_run(true);
    let mut pass = MigrationPass::new(&mut store, options);
    let report = pass.run_at(&corpus(KENTUCKY), at(1)).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.added, 1);
    assert!(report.backup.is_none());
    assert_eq!(pass.trace().last(), Some(&PassState::Done));
    assert!(!pass.trace().contains(&PassState::BackingUp));
    assert!(store.read_all().unwrap().is_empty());
    assert!(store.list_backups().unwrap().is_empty());
}

#[test]
fn test_cancelled_pass_has_no_side_effects() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let options = MigrationOptions::default().with_cancel_token(cancel);

    let mut pass = MigrationPass::new(&mut store, options);
    let err = pass.run_at(&corpus(KENTUCKY), at(1)).unwrap_err();
    assert!(matches!(err, MigrationError::Cancelled));
    assert_eq!(pass.state(), PassState::Failed);
    assert!(store.read_all().unwrap().is_empty());
    assert!(store.list_backups().unwrap().is_empty());
}

#[test]
fn test_parse_skips_are_counted_not_fatal() {
    let text = format!("{KENTUCKY}\nstray text without a heading\n\n---\n## 7.\n");
    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(&text), at(1))
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.parse_skips, 2);
    assert_eq!(report.skips.len(), 2);
}

#[test]
fn test_validation_errors_are_excluded() {
    let text = "## ???\nnotes\n---\n## Real Song\n";
    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(text), at(1))
        .unwrap();
    assert_eq!(report.validation_errors, 1);
    assert_eq!(report.added, 1);
}

#[test]
fn test_cache_and_overrides_fill_gaps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("songs.json");
    let mut store = JsonFileStore::new(&path);
    seed(
        &mut store,
        vec![SongRecord::new(SongKey::from_stored("kentucky-hills"), "Kentucky Hills", at(1))
            .with_lyrics("stored lyrics")],
    );
    store
        .write_field_overrides(&[
            FieldOverride::new(SongKey::from_stored("kentucky-hills"), SongField::Image, "img://1"),
            FieldOverride::new(SongKey::from_stored("kentucky-hills"), SongField::Lyrics, "stale"),
        ])
        .unwrap();

    let cache = r#"{"kentucky-hills": {"audio": "blob://a1", "updated_at": "2024-05-01"}}"#;
    let inputs = vec![
        Input::corpus_text("corpus.md", KENTUCKY),
        Input::cache_text("cache.json", cache),
    ];
    let options = MigrationOptions::default().with_clear_applied_overrides(true);
    let report = MigrationPass::new(&mut store, options)
        .run_at(&inputs, at(2))
        .unwrap();

    let song = store.read_all().unwrap().get("kentucky-hills").unwrap().clone();
    assert_eq!(song.lyrics.as_deref(), Some("stored lyrics"));
    assert_eq!(song.image.as_deref(), Some("img://1"));
    assert_eq!(song.audio.as_deref(), Some("blob://a1"));
    assert_eq!(song.sounds_like.as_deref(), Some("Gillian Welch"));
    assert_eq!(song.version, 2);

    assert_eq!(report.overrides_cleared, 1);
    let remaining = store.read_field_overrides().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].field, SongField::Lyrics);
}

#[test]
fn test_export_reimport_is_a_no_op() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    seed(
        &mut store,
        vec![SongRecord::new(SongKey::from_stored("x-song"), "X Song", at(1))
            .with_lyrics("x")
            .with_notes("Verse A idea\n---\nVerse B idea\n## Bridge\nbridge idea")],
    );
    MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(KENTUCKY), at(1))
        .unwrap();
    let exported = render_corpus(&store.read_all().unwrap());

    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(&exported), at(2))
        .unwrap();
    assert!(!report.has_changes());
    assert_eq!(report.added, 0);
    assert_eq!(report.parse_skips, 0);

    let mut fresh = SqliteStore::open_in_memory().unwrap();
    MigrationPass::new(&mut fresh, MigrationOptions::default())
        .run_at(&corpus(&exported), at(2))
        .unwrap();
    let report = MigrationPass::new(&mut fresh, MigrationOptions::default())
        .run_at(&corpus(&exported), at(3))
        .unwrap();
    assert!(!report.has_changes());

    let original = store.read_all().unwrap();
    let copied = fresh.read_all().unwrap();
    assert_eq!(copied.len(), 2);
    for key in ["x-song", "kentucky-hills"] {
        let a = original.get(key).unwrap();
        let b = copied.get(key).unwrap();
        assert_eq!(a.title, b.title);
        assert_eq!(a.lyrics, b.lyrics);
        assert_eq!(a.notes, b.notes);
        assert_eq!(a.sounds_like, b.sounds_like);
    }
}

#[test]
fn test_cross_source_duplicates_are_counted() {
    let cache = r#"[{"title": "Kentucky Hills", "image": "img://k"}]"#;
    let inputs = vec![
        Input::corpus_text("corpus.md", KENTUCKY),
        Input::cache_text("cache.json", cache),
    ];
    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&inputs, at(1))
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.duplicates_collapsed, 1);

    let song = store.read_all().unwrap().get("kentucky-hills").unwrap().clone();
    assert_eq!(song.image.as_deref(), Some("img://k"));
    assert_eq!(song.notes.as_deref(), Some("Open D tuning, capo 2."));
}

#[test]
fn test_new_entries_keep_corpus_order() {
    let text = "## Charlie\n---\n## Alpha\n---\n## Bravo\n";
    let mut store = SqliteStore::open_in_memory().unwrap();
    seed(
        &mut store,
        vec![SongRecord::new(SongKey::from_stored("zulu"), "Zulu", at(1)).with_lyrics("z")],
    );
    MigrationPass::new(&mut store, MigrationOptions::default())
        .run_at(&corpus(text), at(2))
        .unwrap();
    let keys: Vec<String> = store
        .read_all()
        .unwrap()
        .keys()
        .map(|k| k.to_string())
        .collect();
    assert_eq!(keys, vec!["zulu", "charlie", "alpha", "bravo"]);
}
