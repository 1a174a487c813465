//! Key-event command layer: maps terminal input to player commands and
//! catalog operations. Owns no playback state of its own.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::catalog::{CatalogClient, NewPlaylist, NewSong};
use crate::model::{ActiveSection, AppModel, InputMode};
use crate::player::PlayerController;

const SEEK_STEP_SECONDS: f64 = 5.0;
const VOLUME_STEP: f32 = 0.1;

#[derive(Clone)]
pub struct AppController {
    model: AppModel,
    player: PlayerController,
    catalog: CatalogClient,
}

impl AppController {
    pub fn new(model: AppModel, player: PlayerController, catalog: CatalogClient) -> Self {
        Self {
            model,
            player,
            catalog,
        }
    }

    pub async fn handle_key_event(&self, key: KeyEvent) -> Result<()> {
        // Only handle key press events, not release or repeat
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }

        // While a prompt is open, keys edit the buffer instead of issuing
        // commands.
        if self.model.get_ui_state().await.input_mode.is_some() {
            match key.code {
                KeyCode::Char(c) => self.model.input_char(c).await,
                KeyCode::Backspace => self.model.input_backspace().await,
                KeyCode::Esc => self.model.cancel_input().await,
                KeyCode::Enter => self.commit_input().await,
                _ => {}
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.model.set_should_quit(true).await;
            }
            KeyCode::Esc => {
                self.model.clear_error().await;
            }
            KeyCode::Char('?') => {
                self.model.toggle_help().await;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.model.cycle_section().await;
            }
            KeyCode::Up => {
                self.model.move_selection_up().await;
            }
            KeyCode::Down => {
                self.model.move_selection_down().await;
            }
            KeyCode::Enter => {
                let section = self.model.get_ui_state().await.active_section;
                match section {
                    ActiveSection::Playlists => {
                        if let Some(playlist) = self.model.get_selected_playlist().await {
                            tracing::debug!(playlist_id = %playlist.id, "opening playlist");
                            self.model.open_playlist(playlist.id).await;
                        }
                    }
                    ActiveSection::Songs => {
                        self.play_selected_song().await;
                    }
                }
            }
            KeyCode::Char(' ') => {
                self.player.toggle_playback().await;
            }
            KeyCode::Left => {
                let snapshot = self.player.snapshot().await;
                self.player.seek(snapshot.progress - SEEK_STEP_SECONDS).await;
            }
            KeyCode::Right => {
                let snapshot = self.player.snapshot().await;
                self.player.seek(snapshot.progress + SEEK_STEP_SECONDS).await;
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let snapshot = self.player.snapshot().await;
                self.player.set_volume(snapshot.volume + VOLUME_STEP).await;
            }
            KeyCode::Char('-') => {
                let snapshot = self.player.snapshot().await;
                self.player.set_volume(snapshot.volume - VOLUME_STEP).await;
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                self.refresh_playlists().await;
            }
            KeyCode::Char('n') => {
                self.model.begin_input(InputMode::NewPlaylist).await;
            }
            KeyCode::Char('a') => {
                // A song needs a playlist to land in.
                if self.model.get_open_playlist().await.is_some() {
                    self.model.begin_input(InputMode::AddSong).await;
                }
            }
            KeyCode::Char('d') => {
                self.delete_selected().await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn play_selected_song(&self) {
        let Some((song, playlist)) = self.model.get_selected_song().await else {
            return;
        };
        tracing::info!(song_id = %song.id, title = %song.title, "song selected for playback");
        self.player.load_song(Some(song), Some(playlist)).await;
        self.player.toggle_playback().await;
    }

    async fn commit_input(&self) {
        let Some((mode, text)) = self.model.take_input().await else {
            return;
        };
        let result = match mode {
            InputMode::NewPlaylist => self
                .catalog
                .create_playlist(NewPlaylist {
                    name: text,
                    description: String::new(),
                    cover_url: String::new(),
                    category: String::new(),
                    created_by: "tunebox".to_string(),
                })
                .await
                .map(|playlist| tracing::info!(playlist_id = %playlist.id, "playlist created")),
            InputMode::AddSong => {
                let Some(playlist) = self.model.get_open_playlist().await else {
                    return;
                };
                self.catalog
                    .add_song(
                        &playlist.id,
                        NewSong {
                            title: title_from_url(&text),
                            artist: String::new(),
                            cover_url: String::new(),
                            audio_url: text,
                            category: playlist.category.clone(),
                            age_range: String::new(),
                        },
                    )
                    .await
                    .map(|song| tracing::info!(song_id = %song.id, "song created"))
            }
        };

        match result {
            Ok(()) => self.refresh_playlists().await,
            Err(e) => self.model.set_error(Self::format_error(&e)).await,
        }
    }

    /// Delete the selected song or playlist, depending on the focused
    /// section, then refetch the catalog.
    async fn delete_selected(&self) {
        let section = self.model.get_ui_state().await.active_section;
        let result = match section {
            ActiveSection::Playlists => {
                let Some(playlist) = self.model.get_selected_playlist().await else {
                    return;
                };
                tracing::info!(playlist_id = %playlist.id, name = %playlist.name, "deleting playlist");
                self.catalog.delete_playlist(&playlist.id).await
            }
            ActiveSection::Songs => {
                let Some((song, _)) = self.model.get_selected_song().await else {
                    return;
                };
                tracing::info!(song_id = %song.id, title = %song.title, "deleting song");
                self.catalog.delete_song(&song.id).await
            }
        };

        match result {
            Ok(()) => self.refresh_playlists().await,
            Err(e) => self.model.set_error(Self::format_error(&e)).await,
        }
    }

    /// Reload the catalog into the model; failures land in the error overlay.
    pub async fn refresh_playlists(&self) {
        match self.catalog.fetch_playlists().await {
            Ok(playlists) => {
                tracing::info!(count = playlists.len(), "playlists refreshed");
                self.model.set_playlists(playlists).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch playlists");
                self.model.set_error(Self::format_error(&e)).await;
            }
        }
    }

    /// Format error messages to be user-friendly
    fn format_error(error: &anyhow::Error) -> String {
        let error_str = error.to_string();
        if error_str.contains("404") {
            "Catalog entry not found. Refresh and try again.".to_string()
        } else if error_str.contains("connection") || error_str.contains("connect") {
            "Could not reach the catalog. Is the server running?".to_string()
        } else {
            format!("Error: {error_str}")
        }
    }
}

/// Best-effort song title from the file name part of a URL or path.
fn title_from_url(url: &str) -> String {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    let stem = stem.replace(['_', '-'], " ").trim().to_string();
    if stem.is_empty() { url.to_string() } else { stem }
}
