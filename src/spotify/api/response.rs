use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimplifiedArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimplifiedAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimplifiedShow {
    pub name: String,
    pub publisher: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Track {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    pub album: SimplifiedAlbum,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Episode {
    pub name: String,
    pub uri: String,
    pub show: SimplifiedShow,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Track(Track),
    Episode(Episode),
}

/// Body of `GET /me/player/currently-playing`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub currently_playing_type: Option<String>,
    pub item: Option<Item>,
}

/// Error body of the Web API
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Track,
    Episode,
}

/// What the widget shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub name: String,
    pub artist: String,
    pub album: String,
    pub cover: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub kind: ItemKind,
    pub uri: String,
    pub song: Song,
}

fn first_image(images: &[Image]) -> String {
    images.first().map(|i| i.url.clone()).unwrap_or_default()
}

fn spotify_link(urls: &HashMap<String, String>) -> String {
    urls.get("spotify").cloned().unwrap_or_default()
}

impl From<Item> for NowPlaying {
    fn from(item: Item) -> Self {
        match item {
            Item::Track(track) => NowPlaying {
                kind: ItemKind::Track,
                song: Song {
                    artist: track.artists.first().map(|a| a.name.clone()).unwrap_or_default(),
                    album: track.album.name.clone(),
                    cover: first_image(&track.album.images),
                    link: spotify_link(&track.external_urls),
                    name: track.name,
                },
                uri: track.uri,
            },
            Item::Episode(episode) => NowPlaying {
                kind: ItemKind::Episode,
                song: Song {
                    artist: episode.show.publisher.clone(),
                    album: episode.show.name.clone(),
                    cover: first_image(&episode.images),
                    link: spotify_link(&episode.external_urls),
                    name: episode.name,
                },
                uri: episode.uri,
            },
        }
    }
}

impl CurrentlyPlaying {
    pub fn now_playing(self) -> Option<NowPlaying> {
        self.item.map(NowPlaying::from)
    }
}
