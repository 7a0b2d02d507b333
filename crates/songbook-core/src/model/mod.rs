pub mod candidate;
pub mod catalog;
pub mod field;
pub mod key;
pub mod song;
pub mod tombstone;

pub use candidate::Candidate;
pub use catalog::SongCatalog;
pub use field::SongField;
pub use key::{derive_key, SongKey};
pub use song::SongRecord;
pub use tombstone::Tombstone;
