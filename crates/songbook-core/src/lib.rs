//! Core domain model for songbook.
//!
//! This crate defines the canonical song record, its derived key, the
//! tombstone and override types, and the storage adapters that own the
//! durable collections between migration passes.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod provenance;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
pub use model::{Candidate, SongCatalog, SongField, SongKey, SongRecord, Tombstone};
pub use provenance::{FieldOverride, Source};
pub use snapshot::StoreSnapshot;
pub use store::{BackupInfo, BackupLocation, JsonFileStore, SqliteStore, StorageAdapter, StoreHold};
