use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A mergeable field of a song record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SongField {
    Title,
    Lyrics,
    Notes,
    SoundsLike,
    Image,
    Audio,
}

impl SongField {
    /// The optional content fields, in merge order.
    pub const OPTIONAL: [Self; 5] = [
        Self::Lyrics,
        Self::Notes,
        Self::SoundsLike,
        Self::Image,
        Self::Audio,
    ];

    /// Name used in stores and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Lyrics => "lyrics",
            Self::Notes => "notes",
            Self::SoundsLike => "soundsLike",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for SongField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SongField {
    type Err = Error;

    /// Accepts the wire name as well as the snake_case and lower-case
    /// spellings found in legacy override keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "lyrics" => Ok(Self::Lyrics),
            "notes" => Ok(Self::Notes),
            "soundslike" | "sounds_like" | "sounds-like" => Ok(Self::SoundsLike),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            other => Err(Error::InvalidData(format!("unknown song field: {other}"))),
        }
    }
}
