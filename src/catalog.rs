//! Client for the remote playlist/song catalog.
//!
//! The store exposes three JSON collections (`playlists`, `songs`,
//! `playlist_songs`); playlists are assembled client-side by joining
//! membership rows to songs, ordered by their `position` column.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::{Playlist, PlaylistSong, Song};

/// Payload for creating a song; the store assigns id and timestamps.
#[derive(Clone, Debug, Serialize)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub cover_url: String,
    pub audio_url: String,
    pub category: String,
    pub age_range: String,
}

/// Payload for creating a playlist.
#[derive(Clone, Debug, Serialize)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub cover_url: String,
    pub category: String,
    pub created_by: String,
}

#[derive(Serialize)]
struct NewPlaylistSong<'a> {
    playlist_id: &'a str,
    song_id: &'a str,
    position: u32,
}

#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    /// Fetch all playlists with their songs in playlist order.
    pub async fn fetch_playlists(&self) -> Result<Vec<Playlist>> {
        let playlists: Vec<Playlist> = self.get("playlists").await?;
        let songs: Vec<Song> = self.get("songs").await?;
        let memberships: Vec<PlaylistSong> = self.get("playlist_songs").await?;
        tracing::debug!(
            playlists = playlists.len(),
            songs = songs.len(),
            memberships = memberships.len(),
            "catalog fetched"
        );
        Ok(assemble_playlists(playlists, &songs, memberships))
    }

    pub async fn create_playlist(&self, new: NewPlaylist) -> Result<Playlist> {
        self.post("playlists", &new).await
    }

    /// Create a song and append it to `playlist_id` at the next free
    /// position.
    pub async fn add_song(&self, playlist_id: &str, new: NewSong) -> Result<Song> {
        let song: Song = self.post("songs", &new).await?;

        let memberships: Vec<PlaylistSong> = self.get("playlist_songs").await?;
        let position = next_position(&memberships, playlist_id);

        let _: PlaylistSong = self
            .post(
                "playlist_songs",
                &NewPlaylistSong {
                    playlist_id,
                    song_id: &song.id,
                    position,
                },
            )
            .await?;

        tracing::info!(song_id = %song.id, playlist_id, position, "song added to playlist");
        Ok(song)
    }

    pub async fn delete_song(&self, song_id: &str) -> Result<()> {
        self.delete(&format!("songs/{song_id}")).await
    }

    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        self.delete(&format!("playlists/{playlist_id}")).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {url} failed"))?;
        response
            .json()
            .await
            .with_context(|| format!("GET {url} returned malformed JSON"))
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("POST {url} failed"))?;
        response
            .json()
            .await
            .with_context(|| format!("POST {url} returned malformed JSON"))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/{path}", self.base_url);
        self.http
            .delete(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("DELETE {url} failed"))?;
        Ok(())
    }
}

/// Join membership rows to songs per playlist, ordered by position. Rows
/// referencing unknown songs are dropped.
fn assemble_playlists(
    playlists: Vec<Playlist>,
    songs: &[Song],
    mut memberships: Vec<PlaylistSong>,
) -> Vec<Playlist> {
    memberships.sort_by_key(|m| m.position);
    playlists
        .into_iter()
        .map(|mut playlist| {
            playlist.songs = memberships
                .iter()
                .filter(|m| m.playlist_id == playlist.id)
                .filter_map(|m| songs.iter().find(|s| s.id == m.song_id).cloned())
                .collect();
            playlist
        })
        .collect()
}

fn next_position(memberships: &[PlaylistSong], playlist_id: &str) -> u32 {
    memberships
        .iter()
        .filter(|m| m.playlist_id == playlist_id)
        .map(|m| m.position)
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> Song {
        Song {
            id: id.to_string(),
            title: format!("Song {id}"),
            artist: "Artist".to_string(),
            cover_url: String::new(),
            audio_url: format!("{id}.mp3"),
            category: "counting".to_string(),
            age_range: "3-5".to_string(),
            user_id: None,
            created_at: None,
        }
    }

    fn playlist(id: &str) -> Playlist {
        Playlist {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            cover_url: String::new(),
            category: String::new(),
            created_by: String::new(),
            user_id: None,
            created_at: None,
            songs: Vec::new(),
        }
    }

    fn membership(playlist_id: &str, song_id: &str, position: u32) -> PlaylistSong {
        PlaylistSong {
            id: format!("{playlist_id}:{song_id}"),
            playlist_id: playlist_id.to_string(),
            song_id: song_id.to_string(),
            position,
            created_at: None,
        }
    }

    #[test]
    fn songs_are_joined_in_position_order() {
        let assembled = assemble_playlists(
            vec![playlist("p1"), playlist("p2")],
            &[song("a"), song("b"), song("c")],
            vec![
                membership("p1", "c", 3),
                membership("p1", "a", 1),
                membership("p2", "b", 1),
                membership("p1", "b", 2),
            ],
        );

        let ids: Vec<&str> = assembled[0].songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        let ids: Vec<&str> = assembled[1].songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn rows_pointing_at_missing_songs_are_dropped() {
        let assembled = assemble_playlists(
            vec![playlist("p1")],
            &[song("a")],
            vec![membership("p1", "a", 2), membership("p1", "ghost", 1)],
        );
        let ids: Vec<&str> = assembled[0].songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a"]);
    }

    #[test]
    fn next_position_appends_after_the_highest() {
        let memberships = vec![
            membership("p1", "a", 1),
            membership("p1", "b", 4),
            membership("p2", "c", 9),
        ];
        assert_eq!(next_position(&memberships, "p1"), 5);
        assert_eq!(next_position(&memberships, "empty"), 1);
    }
}
