use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Deserializer, Serialize};
use songbook_core::{JsonFileStore, SqliteStore, StorageAdapter};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which adapter backs the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Sqlite,
    Json,
    /// `.json` paths use the JSON store, anything else SQLite.
    #[default]
    Auto,
}

impl StoreFormat {
    /// The concrete format for a store path.
    #[must_use]
    pub fn resolve(self, path: &Path) -> Self {
        match self {
            Self::Auto => {
                let is_json = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
                if is_json {
                    Self::Json
                } else {
                    Self::Sqlite
                }
            }
            other => other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Json => "json",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown store format '{other}' (expected sqlite, json or auto)")),
        }
    }
}

/// Configuration for songbook.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SONGBOOK_* prefix)
/// 3. Config file (~/.config/songbook/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the song store.
    ///
    /// Can be set via:
    /// - CLI: --store /path/to/store
    /// - ENV: SONGBOOK_STORE_PATH
    /// - Config: store_path = "/path/to/store"
    /// - Default: ~/.local/share/songbook/songbook.db
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Store adapter: sqlite, json or auto.
    #[serde(default)]
    pub store_format: StoreFormat,

    /// Gzip JSON-store backups.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub compress_backups: bool,

    /// After a successful write, delete legacy field overrides whose value
    /// is now in the stored record.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub clear_applied_overrides: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            store_format: StoreFormat::Auto,
            compress_backups: false,
            clear_applied_overrides: false,
        }
    }
}

/// Keys accepted by `config get` / `config set`.
pub const CONFIG_KEYS: [&str; 4] = [
    "store_path",
    "store_format",
    "compress_backups",
    "clear_applied_overrides",
];

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load using a specific config file (which may not exist).
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("songbook");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Load configuration, overriding the store path (the `--store` flag).
    pub fn load_with_store_path(store_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.store_path = store_path;
        Ok(config)
    }

    /// A config value rendered as text, for `config get`.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "store_path" => Some(self.store_path.display().to_string()),
            "store_format" => Some(self.store_format.to_string()),
            "compress_backups" => Some(self.compress_backups.to_string()),
            "clear_applied_overrides" => Some(self.clear_applied_overrides.to_string()),
            _ => None,
        }
    }

    /// Open the configured store, creating its directory if needed.
    pub fn open_store(&self) -> Result<Box<dyn StorageAdapter>> {
        if let Some(parent) = self.store_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create store directory {}", parent.display())
                })?;
            }
        }

        let format = self.store_format.resolve(&self.store_path);
        log::debug!("Opening {} store at {}", format, self.store_path.display());
        let store: Box<dyn StorageAdapter> = match format {
            StoreFormat::Json => Box::new(
                JsonFileStore::new(&self.store_path)
                    .with_compressed_backups(self.compress_backups),
            ),
            _ => Box::new(SqliteStore::open(&self.store_path).with_context(|| {
                format!("Failed to open store {}", self.store_path.display())
            })?),
        };
        Ok(store)
    }
}

/// Environment values arrive as strings; accept `true`/`false` either way.
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got '{other}'"
            ))),
        },
    }
}

/// Get the default store path.
///
/// Returns: ~/.local/share/songbook/songbook.db (or platform equivalent)
fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songbook")
        .join("songbook.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/songbook/config.toml
/// - macOS: ~/Library/Application Support/songbook/config.toml
/// - Windows: %APPDATA%\songbook\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songbook")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Songbook Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (SONGBOOK_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the song store
#
# A path ending in .json uses the JSON document store; anything else is
# a SQLite database (see store_format).
#
# Can also be set via:
# - CLI: songbook --store /custom/path.db migrate corpus.md
# - Environment: SONGBOOK_STORE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#store_path = "/path/to/custom/songbook.db"

# Store adapter: "sqlite", "json" or "auto" (decide by file extension)
store_format = "auto"

# Gzip backups written by the JSON store
compress_backups = false

# After a successful migration, delete legacy per-field overrides whose
# value now lives in the stored record
clear_applied_overrides = false
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
