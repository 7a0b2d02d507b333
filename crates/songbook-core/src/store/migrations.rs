/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Song documents, in display order
CREATE TABLE IF NOT EXISTS songs (
    key TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    lyrics TEXT,
    notes TEXT,
    sounds_like TEXT,
    image TEXT,
    audio TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_songs_position ON songs(position);

-- Explicit deletions
CREATE TABLE IF NOT EXISTS tombstones (
    key TEXT PRIMARY KEY,
    deleted_at TEXT NOT NULL
);

-- Legacy per-field overrides
CREATE TABLE IF NOT EXISTS field_overrides (
    key TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT,
    PRIMARY KEY (key, field)
);

-- Full-state backups taken before destructive writes
CREATE TABLE IF NOT EXISTS backups (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    created_at TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_backups_created_at ON backups(created_at);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];
