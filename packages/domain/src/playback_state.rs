//! Playback driver states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the playback driver.
///
/// `Playing` always has a current item and a start time; every other state
/// has neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Searching,
    Playing,
    WaitingForData,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Searching => "searching",
            PlaybackState::Playing => "playing",
            PlaybackState::WaitingForData => "waiting-for-data",
        };
        f.write_str(name)
    }
}
