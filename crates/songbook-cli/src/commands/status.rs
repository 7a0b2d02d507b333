use anyhow::Result;
use songbook_etl::{ops, Config};

pub fn show_status(config: &Config, json: bool) -> Result<()> {
    let store = config.open_store()?;
    let status = ops::status(store.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\n📊 Songbook Status\n");
    println!("  Store: {}", status.store);
    println!("  Songs: {}", status.songs);
    println!("  Empty songs: {}", status.empty);
    println!("  Tombstones: {}", status.tombstones);
    println!("  Legacy field overrides: {}", status.field_overrides);
    println!("  Backups: {}", status.backups);
    if let Some(latest) = &status.latest_backup {
        println!(
            "  Latest backup: {} ({})",
            latest.location.id,
            latest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if status.empty > 0 {
        println!("\n  Run `songbook prune` to review empty songs");
    }

    Ok(())
}
