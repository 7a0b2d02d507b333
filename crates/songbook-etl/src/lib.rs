//! Reconciliation and migration engine for songbook.
//!
//! A pass parses the corpus and any local caches, normalizes and
//! deduplicates the candidates, merges them against a snapshot of the
//! store, backs up the pre-pass state and writes the result. See
//! [`MigrationPass`] for the state machine and [`ops`] for the explicit
//! delete/undelete/prune/restore operations.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod corpus;
pub mod dedup;
pub mod error;
pub mod export;
pub mod merge;
pub mod normalize;
pub mod ops;
pub mod orchestrator;
pub mod report;
pub mod sources;
pub mod tombstone;

pub use config::{Config, StoreFormat};
pub use corpus::{parse_corpus, ParseSkip, RawRecord};
pub use dedup::{deduplicate, Deduplicated};
pub use error::{MigrationError, MigrationResult};
pub use export::render_corpus;
pub use merge::{merge, merge_sources, MergeClass, MergeOutcome};
pub use normalize::{clean_title, normalize, normalize_batch, ValidationError};
pub use orchestrator::{CancelToken, MigrationOptions, MigrationPass, PassState};
pub use report::MigrationReport;
pub use sources::Input;
pub use tombstone::TombstoneTracker;
