use anyhow::{Context, Result};
use songbook_etl::{render_corpus, Config};
use std::path::PathBuf;

pub fn export(config: &Config, out: Option<PathBuf>) -> Result<()> {
    let store = config.open_store()?;
    let songs = store.read_all()?;
    let text = render_corpus(&songs);

    match out {
        Some(path) => {
            std::fs::write(&path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("✓ Exported {} songs to {}", songs.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
