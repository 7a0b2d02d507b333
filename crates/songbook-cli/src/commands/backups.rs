use anyhow::{Context, Result};
use chrono::Utc;
use songbook_etl::{ops, Config};

pub fn list_backups(config: &Config, json: bool) -> Result<()> {
    let store = config.open_store()?;
    let backups = ops::list_backups(store.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }

    if backups.is_empty() {
        println!("No backups in {}", store.describe());
        return Ok(());
    }

    for backup in &backups {
        println!(
            "{}  {:>5} songs  {}  {}",
            backup.created_at.format("%Y-%m-%d %H:%M:%S"),
            backup.record_count,
            backup.location.id,
            backup.location.location
        );
    }
    Ok(())
}

pub fn restore(config: &Config, backup_id: &str) -> Result<()> {
    let mut store = config.open_store()?;
    let outcome = ops::restore_backup(store.as_mut(), backup_id, Utc::now())
        .with_context(|| format!("Failed to restore backup {backup_id}"))?;

    println!(
        "✓ Restored {} songs and {} tombstones from {}",
        outcome.songs, outcome.tombstones, outcome.restored_from
    );
    println!("  Previous state saved as {}", outcome.backup);
    Ok(())
}
