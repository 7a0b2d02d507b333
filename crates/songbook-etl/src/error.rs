//! Migration error types.

use songbook_core::BackupLocation;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions of a migration pass or an explicit store operation.
///
/// Recoverable conditions ([`ParseSkip`](crate::corpus::ParseSkip),
/// [`ValidationError`](crate::normalize::ValidationError)) are not errors;
/// they are counted in the report.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The store could not be held or read at pass start.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] songbook_core::Error),

    /// An input (corpus or cache file) could not be read at all.
    #[error("failed to read {path}: {source}")]
    CorpusRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A local-cache input is not a JSON record collection.
    #[error("invalid cache file {path}: {source}")]
    InvalidCache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The pre-write backup failed. Nothing was written.
    #[error("backup failed, store left untouched: {0}")]
    BackupFailure(#[source] songbook_core::Error),

    /// The write failed after a backup was taken.
    #[error("write failed; the previous state is recoverable from backup {backup}: {source}")]
    WriteFailure {
        backup: BackupLocation,
        #[source]
        source: songbook_core::Error,
    },

    /// The pass was cancelled before writing began.
    #[error("pass cancelled before writing")]
    Cancelled,

    /// A store error outside a pass (explicit operations).
    #[error("store error: {0}")]
    Store(#[from] songbook_core::Error),
}

impl MigrationError {
    /// Returns `true` when the store is guaranteed to be in its pre-pass
    /// state.
    pub fn is_fatal_before_write(&self) -> bool {
        !matches!(self, Self::WriteFailure { .. } | Self::Store(_))
    }

    /// The backup holding the pre-pass state, if one was taken.
    pub fn backup(&self) -> Option<&BackupLocation> {
        match self {
            Self::WriteFailure { backup, .. } => Some(backup),
            _ => None,
        }
    }
}

/// Convenience alias for migration results.
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_before_write() {
        assert!(MigrationError::Cancelled.is_fatal_before_write());
        assert!(MigrationError::BackupFailure(songbook_core::Error::InvalidData("x".into()))
            .is_fatal_before_write());

        let write = MigrationError::WriteFailure {
            backup: BackupLocation {
                id: "b1".to_string(),
                location: "/tmp/b1.json".to_string(),
            },
            source: songbook_core::Error::InvalidData("disk full".into()),
        };
        assert!(!write.is_fatal_before_write());
        assert_eq!(write.backup().map(|b| b.id.as_str()), Some("b1"));
        assert!(write.to_string().contains("b1"));
    }
}
