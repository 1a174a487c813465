//! Core type definitions for the application

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A playable song from the catalog. Immutable once handed to the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub cover_url: String,
    pub audio_url: String,
    pub category: String,
    pub age_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A named, ordered sequence of songs. The order of `songs` defines the
/// "next song" traversal during playback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cover_url: String,
    pub category: String,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl Playlist {
    /// The song that follows `song_id` in this playlist, if any.
    pub fn song_after(&self, song_id: &str) -> Option<&Song> {
        let index = self.songs.iter().position(|s| s.id == song_id)?;
        self.songs.get(index + 1)
    }
}

/// Membership row linking a song into a playlist at a position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSong {
    pub id: String,
    pub playlist_id: String,
    pub song_id: String,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Which section of the UI is currently active/focused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveSection {
    Playlists,
    Songs,
}

impl ActiveSection {
    pub fn next(self) -> Self {
        match self {
            ActiveSection::Playlists => ActiveSection::Songs,
            ActiveSection::Songs => ActiveSection::Playlists,
        }
    }
}

/// What a line of typed input will be committed as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Name for a new playlist.
    NewPlaylist,
    /// Audio URL (or local path) for a song to append to the open playlist.
    AddSong,
}

impl InputMode {
    pub fn prompt(self) -> &'static str {
        match self {
            InputMode::NewPlaylist => "New playlist name",
            InputMode::AddSong => "Audio URL for the new song",
        }
    }
}

/// UI state for the application
#[derive(Clone)]
pub struct UiState {
    pub active_section: ActiveSection,
    pub playlist_selected: usize,
    pub song_selected: usize,
    /// Playlist currently opened in the song list, by id.
    pub open_playlist: Option<String>,
    pub error_message: Option<String>,
    pub error_timestamp: Option<Instant>,
    pub show_help_popup: bool,
    /// When set, key presses edit `input_buffer` instead of issuing commands.
    pub input_mode: Option<InputMode>,
    pub input_buffer: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            active_section: ActiveSection::Playlists,
            playlist_selected: 0,
            song_selected: 0,
            open_playlist: None,
            error_message: None,
            error_timestamp: None,
            show_help_popup: false,
            input_mode: None,
            input_buffer: String::new(),
        }
    }
}
