//! Application configuration.
//!
//! Read from `tunebox.json` in the working directory when present, with
//! `TUNEBOX_CATALOG_URL` and `TUNEBOX_VOLUME` environment overrides on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "tunebox.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the playlist/song catalog.
    pub catalog_url: String,
    /// Initial volume, clamped to [0, 1] on load.
    pub volume: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_url: "http://localhost:4000".to_string(),
            volume: 0.5,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut config = Self::from_file(Path::new(CONFIG_FILE)).unwrap_or_else(|| {
            tracing::debug!("no {CONFIG_FILE} found, using defaults");
            Self::default()
        });

        if let Ok(url) = std::env::var("TUNEBOX_CATALOG_URL") {
            config.catalog_url = url;
        }
        if let Ok(volume) = std::env::var("TUNEBOX_VOLUME") {
            match volume.parse::<f32>() {
                Ok(volume) => config.volume = volume,
                Err(_) => tracing::warn!(volume, "ignoring unparsable TUNEBOX_VOLUME"),
            }
        }

        config.volume = config.volume.clamp(0.0, 1.0);
        config
    }

    fn from_file(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(error = %e, "malformed {CONFIG_FILE}, using defaults");
                None
            }
        }
    }
}
