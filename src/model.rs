//! Application data model: catalog types, playback snapshot, shared state.

mod app_model;
mod playback;
mod types;

pub use app_model::AppModel;
pub use playback::{PlayerSnapshot, TransportState};
pub use types::{ActiveSection, InputMode, Playlist, PlaylistSong, Song, UiState};
