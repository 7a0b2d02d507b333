use anyhow::{Context, Result};
use songbook_etl::config::{self, CONFIG_KEYS};
use songbook_etl::{Config, StoreFormat};
use toml_edit::{value, DocumentMut};

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    for key in CONFIG_KEYS {
        println!("  {}: {}", key, config.get(key).unwrap_or_default());
    }
    println!(
        "  (resolved store format: {})",
        config.store_format.resolve(&config.store_path)
    );

    println!("\nPriority: CLI args > ENV vars (SONGBOOK_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value, or print the whole config file.
pub fn get_config(key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        let config = Config::load()?;
        let Some(current) = config.get(&key) else {
            anyhow::bail!(
                "Unknown config key: {}\n\nValid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            );
        };
        println!("{current}");
    } else {
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'songbook config init' to create it.");
        }
    }

    Ok(())
}

/// Set a config value, preserving the rest of the file (comments included).
pub fn set_config(key: &str, raw: &str) -> Result<()> {
    let config_path = config::config_file_path();

    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let updated = apply_setting(&contents, key, raw)?;

    std::fs::write(&config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {} = {}", key, raw);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Validate `raw` for `key` and write it into the TOML text.
fn apply_setting(contents: &str, key: &str, raw: &str) -> Result<String> {
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Failed to parse config file")?;

    match key {
        "store_path" => doc[key] = value(raw),
        "store_format" => {
            let format: StoreFormat = raw.parse().map_err(anyhow::Error::msg)?;
            doc[key] = value(format.as_str());
        }
        "compress_backups" | "clear_applied_overrides" => {
            let flag: bool = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} expects true or false, got '{raw}'"))?;
            doc[key] = value(flag);
        }
        _ => {
            anyhow::bail!(
                "Unknown config key: {}\n\nValid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            );
        }
    }

    Ok(doc.to_string())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure songbook.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
