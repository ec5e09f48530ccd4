//! Derived now-playing state.
//!
//! A pure reducer folds the stream of protocol messages into one
//! [`PlaybackState`] snapshot. The adapter owns the snapshot and the HTTP
//! layer reads it through a synchronized accessor; this module never does
//! I/O.

use serde::{Deserialize, Serialize};

use crate::protocol::YncaMessage;

/// Transport/playback status as reported by the active source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStatus {
    #[serde(rename = "PLAYING")]
    Playing,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "STANDBY")]
    Standby,
}

/// Source the receiver is currently playing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    #[serde(rename = "BLUETOOTH")]
    Bluetooth,
    #[serde(rename = "AIRPLAY")]
    AirPlay,
    #[serde(rename = "SPOTIFY")]
    Spotify,
    #[serde(rename = "OTHER")]
    Other,
}

/// Track metadata. Fields are empty strings until the source reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub artist: String,
    pub album: String,
    pub title: String,
}

/// The queryable now-playing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlayStatus,
    pub media: MediaInfo,
    pub input: InputSource,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlayStatus::Standby,
            media: MediaInfo::default(),
            input: InputSource::Other,
        }
    }
}

/// Fold one message into the state, returning whether anything changed.
///
/// Dispatch is keyed on (sub_unit, function). Status and metadata are
/// independent: a metadata report never touches status/input and a
/// playback report never touches metadata. A Pause report deliberately
/// leaves `input` at whatever source last reported Play, so the snapshot
/// keeps saying what was playing.
pub fn apply(state: &mut PlaybackState, message: &YncaMessage) -> bool {
    let source = match message.sub_unit.as_str() {
        "AIRPLAY" => InputSource::AirPlay,
        "BT" => InputSource::Bluetooth,
        "SPOTIFY" => InputSource::Spotify,
        _ => return false,
    };

    match message.function.as_str() {
        "PLAYBACKINFO" => match message.value.as_str() {
            "Play" => {
                state.status = PlayStatus::Playing;
                state.input = source;
                true
            }
            "Pause" => {
                state.status = PlayStatus::Pause;
                true
            }
            _ => false,
        },
        "ARTIST" => {
            state.media.artist = message.value.clone();
            true
        }
        "ALBUM" => {
            state.media.album = message.value.clone();
            true
        }
        // AirPlay and Bluetooth report the track title as SONG, Spotify
        // as TRACK. Each name is only valid for its own sources.
        "SONG" if source != InputSource::Spotify => {
            state.media.title = message.value.clone();
            true
        }
        "TRACK" if source == InputSource::Spotify => {
            state.media.title = message.value.clone();
            true
        }
        _ => false,
    }
}
