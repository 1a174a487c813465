//! Shared application state with async accessors

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::types::{ActiveSection, InputMode, Playlist, Song, UiState};

const ERROR_DISPLAY_DURATION: Duration = Duration::from_secs(5);

/// Application model shared between the input controller and the render loop.
///
/// All fields sit behind `Arc<Mutex<_>>` so clones of the model observe the
/// same state.
#[derive(Clone)]
pub struct AppModel {
    playlists: Arc<Mutex<Vec<Playlist>>>,
    ui_state: Arc<Mutex<UiState>>,
    should_quit: Arc<Mutex<bool>>,
}

impl AppModel {
    pub fn new() -> Self {
        Self {
            playlists: Arc::new(Mutex::new(Vec::new())),
            ui_state: Arc::new(Mutex::new(UiState::default())),
            should_quit: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn set_playlists(&self, playlists: Vec<Playlist>) {
        let mut state = self.ui_state.lock().await;
        let mut stored = self.playlists.lock().await;
        if state.playlist_selected >= playlists.len() {
            state.playlist_selected = playlists.len().saturating_sub(1);
        }
        *stored = playlists;
    }

    pub async fn get_playlists(&self) -> Vec<Playlist> {
        self.playlists.lock().await.clone()
    }

    pub async fn get_selected_playlist(&self) -> Option<Playlist> {
        let state = self.ui_state.lock().await;
        let playlists = self.playlists.lock().await;
        playlists.get(state.playlist_selected).cloned()
    }

    /// The playlist currently opened in the song list.
    pub async fn get_open_playlist(&self) -> Option<Playlist> {
        let state = self.ui_state.lock().await;
        let open_id = state.open_playlist.clone()?;
        let playlists = self.playlists.lock().await;
        playlists.iter().find(|p| p.id == open_id).cloned()
    }

    pub async fn get_selected_song(&self) -> Option<(Song, Playlist)> {
        let state = self.ui_state.lock().await;
        let open_id = state.open_playlist.clone()?;
        let playlists = self.playlists.lock().await;
        let playlist = playlists.iter().find(|p| p.id == open_id)?;
        let song = playlist.songs.get(state.song_selected)?.clone();
        Some((song, playlist.clone()))
    }

    pub async fn open_playlist(&self, playlist_id: String) {
        let mut state = self.ui_state.lock().await;
        state.open_playlist = Some(playlist_id);
        state.song_selected = 0;
        state.active_section = ActiveSection::Songs;
    }

    pub async fn get_ui_state(&self) -> UiState {
        self.ui_state.lock().await.clone()
    }

    pub async fn cycle_section(&self) {
        let mut state = self.ui_state.lock().await;
        state.active_section = state.active_section.next();
    }

    pub async fn toggle_help(&self) {
        let mut state = self.ui_state.lock().await;
        state.show_help_popup = !state.show_help_popup;
    }

    pub async fn move_selection_up(&self) {
        let mut state = self.ui_state.lock().await;
        match state.active_section {
            ActiveSection::Playlists => {
                state.playlist_selected = state.playlist_selected.saturating_sub(1);
            }
            ActiveSection::Songs => {
                state.song_selected = state.song_selected.saturating_sub(1);
            }
        }
    }

    // Lock order is ui_state then playlists, everywhere in this type.
    pub async fn move_selection_down(&self) {
        let open_playlist = self.get_open_playlist().await;
        let mut state = self.ui_state.lock().await;
        let playlists = self.playlists.lock().await;
        match state.active_section {
            ActiveSection::Playlists => {
                if state.playlist_selected < playlists.len().saturating_sub(1) {
                    state.playlist_selected += 1;
                }
            }
            ActiveSection::Songs => {
                let song_count = open_playlist.map(|p| p.songs.len()).unwrap_or(0);
                if state.song_selected < song_count.saturating_sub(1) {
                    state.song_selected += 1;
                }
            }
        }
    }

    pub async fn begin_input(&self, mode: InputMode) {
        let mut state = self.ui_state.lock().await;
        state.input_mode = Some(mode);
        state.input_buffer.clear();
    }

    pub async fn input_char(&self, c: char) {
        let mut state = self.ui_state.lock().await;
        if state.input_mode.is_some() {
            state.input_buffer.push(c);
        }
    }

    pub async fn input_backspace(&self) {
        let mut state = self.ui_state.lock().await;
        if state.input_mode.is_some() {
            state.input_buffer.pop();
        }
    }

    pub async fn cancel_input(&self) {
        let mut state = self.ui_state.lock().await;
        state.input_mode = None;
        state.input_buffer.clear();
    }

    /// Close the input prompt and hand back what was typed, if non-empty.
    pub async fn take_input(&self) -> Option<(InputMode, String)> {
        let mut state = self.ui_state.lock().await;
        let mode = state.input_mode.take()?;
        let text = std::mem::take(&mut state.input_buffer);
        let text = text.trim().to_string();
        if text.is_empty() { None } else { Some((mode, text)) }
    }

    pub async fn set_error(&self, message: String) {
        let mut state = self.ui_state.lock().await;
        state.error_message = Some(message);
        state.error_timestamp = Some(Instant::now());
    }

    pub async fn clear_error(&self) {
        let mut state = self.ui_state.lock().await;
        state.error_message = None;
        state.error_timestamp = None;
    }

    /// Drop error notifications that have been on screen long enough.
    pub async fn auto_clear_old_errors(&self) {
        let mut state = self.ui_state.lock().await;
        if let Some(timestamp) = state.error_timestamp {
            if timestamp.elapsed() > ERROR_DISPLAY_DURATION {
                state.error_message = None;
                state.error_timestamp = None;
            }
        }
    }

    pub async fn should_quit(&self) -> bool {
        *self.should_quit.lock().await
    }

    pub async fn set_should_quit(&self, quit: bool) {
        *self.should_quit.lock().await = quit;
    }
}
