use anyhow::{Context, Result};
use chrono::Utc;
use songbook_etl::{ops, Config};

pub fn delete(config: &Config, key: &str) -> Result<()> {
    let mut store = config.open_store()?;
    let outcome = ops::delete_song(store.as_mut(), key, Utc::now())
        .with_context(|| format!("Failed to delete {key}"))?;

    match (&outcome.removed, outcome.newly_tombstoned) {
        (Some(song), _) => println!("✓ Deleted '{}' ({key})", song.title),
        (None, true) => println!("✓ No song stored under {key}; tombstoned it anyway"),
        (None, false) => println!("{key} was already deleted"),
    }
    if let Some(backup) = &outcome.backup {
        println!("  Backup: {backup}");
    }
    Ok(())
}

pub fn undelete(config: &Config, key: &str) -> Result<()> {
    let mut store = config.open_store()?;
    if ops::undelete_song(store.as_mut(), key)? {
        println!("✓ {key} may be imported again");
        println!("  Run `songbook migrate` or `songbook restore` to bring its content back");
    } else {
        println!("{key} is not deleted");
    }
    Ok(())
}

pub fn prune(config: &Config, confirm: bool) -> Result<()> {
    let mut store = config.open_store()?;
    let outcome = ops::prune_empty(store.as_mut(), confirm, Utc::now())?;

    if outcome.empty.is_empty() {
        println!("No empty songs");
        return Ok(());
    }

    println!("Empty songs ({}):", outcome.empty.len());
    for key in &outcome.empty {
        println!("  {key}");
    }

    if outcome.removed {
        println!("\n✓ Removed {} empty songs", outcome.empty.len());
        if let Some(backup) = &outcome.backup {
            println!("  Backup: {backup}");
        }
    } else {
        println!("\nRun `songbook prune --confirm` to remove them");
    }
    Ok(())
}
