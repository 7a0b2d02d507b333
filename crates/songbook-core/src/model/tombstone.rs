use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::key::SongKey;

/// Marks a key as explicitly deleted so later merges cannot resurrect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub key: SongKey,
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    #[must_use]
    pub fn new(key: SongKey, deleted_at: DateTime<Utc>) -> Self {
        Self { key, deleted_at }
    }
}
