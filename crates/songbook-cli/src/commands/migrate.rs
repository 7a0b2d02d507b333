use anyhow::{Context, Result};
use songbook_etl::{Config, Input, MigrationOptions, MigrationPass};
use std::path::PathBuf;

pub fn run_migrate(
    config: &Config,
    corpus: PathBuf,
    caches: Vec<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let mut store = config.open_store()?;

    let mut inputs = vec![Input::corpus_file(&corpus)];
    inputs.extend(caches.into_iter().map(Input::cache_file));

    let options = MigrationOptions::default()
        .with_dry_run(dry_run)
        .with_clear_applied_overrides(config.clear_applied_overrides);

    if !json {
        println!("\n🎵 Songbook migration\n");
        println!("  Corpus: {}", corpus.display());
        println!("  Store:  {}", store.describe());
        if dry_run {
            println!("  Mode:   dry run (nothing will be written)");
        }
        println!();
    }

    let mut pass = MigrationPass::new(store.as_mut(), options);
    let result = pass.run(&inputs);
    log::debug!(
        "Pass trace: {}",
        pass.trace()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if e.is_fatal_before_write() {
                eprintln!("✗ Pass failed; the store was not modified.");
            } else if let Some(backup) = e.backup() {
                eprintln!("✗ Write failed. Restore the previous state with:");
                eprintln!("    songbook restore {}", backup.id);
            }
            return Err(e).context("Migration pass failed");
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{report}");
    for skip in &report.skips {
        println!("  ⚠ skipped {skip}");
    }
    if dry_run {
        println!("\nRun without --dry-run to apply these changes.");
    } else {
        println!("\n✓ Migration complete");
    }
    Ok(())
}
