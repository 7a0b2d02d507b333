pub mod backups;
pub mod config;
pub mod export;
pub mod migrate;
pub mod songs;
pub mod status;

pub use backups::{list_backups, restore};
pub use export::export;
pub use migrate::run_migrate;
pub use songs::{delete, prune, undelete};
pub use status::show_status;
