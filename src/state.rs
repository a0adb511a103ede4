//! State published by the client.
//!
//! The client tracks two pieces of state, each under its own key:
//! * [`StateKey::Connection`] holds the [`ConnectionStatus`]
//! * [`StateKey::Track`] holds the last [`TrackInfo`] pushed by the server
//!
//! Values are carried in the tagged [`StateValue`] union so that observers can
//! match on what changed without any dynamic typing.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Status of the connection to the server.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot of the media playing on the server.
///
/// The server sends complete snapshots, so every update replaces the previous
/// value as a whole.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub playing: bool,

    /// PNG image, base64 encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
}

impl TrackInfo {
    /// Decodes the album art into PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the album art is not valid base64.
    pub fn album_art_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.album_art
            .as_deref()
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|e| Error::invalid_argument(format!("invalid album art: {e}")))
            })
            .transpose()
    }
}

impl fmt::Display for TrackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.playing { "playing" } else { "paused" };
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => write!(f, "{artist} - {title} ({state})"),
            (None, Some(title)) => write!(f, "{title} ({state})"),
            (Some(artist), None) => write!(f, "{artist} ({state})"),
            (None, None) => write!(f, "unknown track ({state})"),
        }
    }
}

/// Keys under which state is stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateKey {
    Connection,
    Track,
}

impl StateKey {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connected",
            Self::Track => "trackInfo",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value, tagged with the key it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateValue {
    Connection(ConnectionStatus),
    Track(TrackInfo),
}

impl StateValue {
    #[must_use]
    pub fn key(&self) -> StateKey {
        match self {
            Self::Connection(_) => StateKey::Connection,
            Self::Track(_) => StateKey::Track,
        }
    }
}

impl From<ConnectionStatus> for StateValue {
    fn from(status: ConnectionStatus) -> Self {
        Self::Connection(status)
    }
}

impl From<TrackInfo> for StateValue {
    fn from(track: TrackInfo) -> Self {
        Self::Track(track)
    }
}
