use serde::Deserialize;

/// Deserialize with the json path included in failures.
#[macro_export]
macro_rules! pares {
    ($value: expr) => {{
        let jd = &mut serde_json::Deserializer::from_str($value);
        serde_path_to_error::deserialize(jd)
    }};
    ($type: ty: $value: expr) => {{
        let jd = &mut serde_json::Deserializer::from_str($value);
        serde_path_to_error::deserialize::<_, $type>(jd)
    }};
}

pub use crate::pares;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Album {
    /// Cover art in several sizes, widest first.
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub album: Album,
    pub duration_ms: u64,
}

/// The playback state reported by the currently-playing endpoint. Ephemeral;
/// owned by the poll invocation that fetched it, never persisted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CurrentlyPlaying {
    /// The playing track. Null for ads and some local content.
    #[serde(default)]
    pub item: Option<Track>,
    /// Progress into the item. Can be null.
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub is_playing: bool,
}

impl CurrentlyPlaying {
    pub fn track(&self) -> Option<&Track> {
        self.item.as_ref()
    }

    pub fn artist_names(&self) -> Vec<&str> {
        self.track()
            .map(|track| track.artists.iter().map(|a| a.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Mid-size cover art, the second entry of the album image list.
    pub fn artwork_url(&self) -> Option<&str> {
        self.track()
            .and_then(|track| track.album.images.get(1))
            .map(|image| image.url.as_str())
    }
}
