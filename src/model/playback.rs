//! Playback-related types shared between the player and the view

use super::types::{Playlist, Song};

/// Coarse transport state derived from the player snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

/// Read-only view of the player state, cloned out for rendering.
///
/// `duration` stays 0.0 until the output resource has resolved the track
/// metadata; `volume` is always in `[0.0, 1.0]`.
#[derive(Clone, Debug)]
pub struct PlayerSnapshot {
    pub current_song: Option<Song>,
    pub current_playlist: Option<Playlist>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub has_error: bool,
    pub volume: f32,
    pub progress: f64,
    pub duration: f64,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            current_song: None,
            current_playlist: None,
            is_playing: false,
            is_loading: false,
            has_error: false,
            volume: 0.5,
            progress: 0.0,
            duration: 0.0,
        }
    }
}

impl PlayerSnapshot {
    pub fn transport(&self) -> TransportState {
        if self.has_error {
            TransportState::Error
        } else if self.is_loading {
            TransportState::Loading
        } else if self.is_playing {
            TransportState::Playing
        } else if self.current_song.is_some() {
            TransportState::Paused
        } else {
            TransportState::Idle
        }
    }
}
