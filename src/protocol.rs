//! Wire format spoken with the media server.
//!
//! All frames are text:
//! * outbound, a bare command token such as `play`
//! * inbound, either the literal `No media playing` or a JSON snapshot like
//!   `{"Artist":"A","Title":"T","Playing":true,"AlbumArt":"..."}`

use std::{fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    state::TrackInfo,
};

/// Frame the server sends when no media session is active.
pub const NO_MEDIA: &str = "No media playing";

/// Playback controls understood by the server.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Play,
    Pause,
    Next,
    Previous,
}

impl Command {
    pub const ALL: [Self; 4] = [Self::Play, Self::Pause, Self::Next, Self::Previous];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }

    /// Returns the command that flips the current play state.
    #[must_use]
    pub fn toggle(playing: bool) -> Self {
        if playing {
            Self::Pause
        } else {
            Self::Play
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown command \"{s}\"")))
    }
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    NoMedia,
    Track(TrackInfo),
}

impl Inbound {
    /// Parses a text frame from the server.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the frame is neither [`NO_MEDIA`] nor a
    /// track snapshot.
    pub fn parse(frame: &str) -> Result<Self> {
        if frame == NO_MEDIA {
            return Ok(Self::NoMedia);
        }

        serde_json::from_str::<TrackInfo>(frame)
            .map(Self::Track)
            .map_err(|e| Error::invalid_argument(format!("malformed frame: {e}")))
    }

    /// Produces the track state that follows `previous` after this frame.
    ///
    /// Snapshots replace the previous track. `NoMedia` only clears the
    /// playing flag: artist, title and album art of the last track are kept.
    #[must_use]
    pub fn apply(self, previous: Option<TrackInfo>) -> TrackInfo {
        match self {
            Self::Track(track) => track,
            Self::NoMedia => TrackInfo {
                playing: false,
                ..previous.unwrap_or_default()
            },
        }
    }
}
