use anyhow::Result;
use clap::Parser;
use songbook_etl::Config;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "songbook", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the store (default: ~/.local/share/songbook/songbook.db)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Run a migration pass: merge a corpus (and local caches) into the store
    ///
    /// The corpus is a Markdown-like text backup: one section per song,
    /// introduced by an anchor and/or a `##` heading, with an optional fenced
    /// lyrics block and a "Notes" sub-heading. Sections are separated by
    /// horizontal rules.
    ///
    /// Existing store content is authoritative: a pass only fills empty
    /// fields and never overwrites anything already stored. Deleted
    /// (tombstoned) songs are never brought back.
    ///
    /// Before anything is written, the current store state is backed up.
    /// Use 'songbook backups' to list backups and 'songbook restore' to roll
    /// back.
    Migrate {
        /// Path to the corpus file
        corpus: PathBuf,

        /// Local cache dump (JSON) to merge as well; may be repeated
        #[arg(long = "cache")]
        caches: Vec<PathBuf>,

        /// Report what would change without backing up or writing
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show store contents at a glance
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a song and tombstone its key
    Delete {
        /// Song key
        key: String,
    },
    /// Remove a tombstone so the key may be imported again
    Undelete {
        /// Song key
        key: String,
    },
    /// List empty songs (no content, no human title) and optionally remove them
    Prune {
        /// Actually remove them (a backup is taken first)
        #[arg(long)]
        confirm: bool,
    },
    /// List store backups, oldest first
    Backups {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the store contents with a backup
    Restore {
        /// Backup id (see 'songbook backups')
        backup_id: String,
    },
    /// Export the store in corpus format
    Export {
        /// Output file (default: stdout)
        out: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print one value, or the whole config file
    Get {
        /// Config key
        key: Option<String>,
    },
    /// Set a value in the config file
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

fn load_config(store: Option<PathBuf>) -> Result<Config> {
    match store {
        Some(path) => Config::load_with_store_path(path),
        None => Config::load(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command, store } = Cli::parse();

    match command {
        Commands::Config { command } => run_config(command),
        command => run_store_command(command, &load_config(store)?),
    }
}

fn run_config(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => commands::config::show_config(),
        ConfigCommand::Get { key } => commands::config::get_config(key),
        ConfigCommand::Set { key, value } => commands::config::set_config(&key, &value),
        ConfigCommand::Path => commands::config::show_path(),
        ConfigCommand::Example => commands::config::show_example(),
        ConfigCommand::Init => commands::config::init_config(),
    }
}

fn run_store_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Migrate {
            corpus,
            caches,
            dry_run,
            json,
        } => commands::run_migrate(config, corpus, caches, dry_run, json),
        Commands::Status { json } => commands::show_status(config, json),
        Commands::Delete { key } => commands::delete(config, &key),
        Commands::Undelete { key } => commands::undelete(config, &key),
        Commands::Prune { confirm } => commands::prune(config, confirm),
        Commands::Backups { json } => commands::list_backups(config, json),
        Commands::Restore { backup_id } => commands::restore(config, &backup_id),
        Commands::Export { out } => commands::export(config, out),
        Commands::Config { command } => run_config(command),
    }
}
