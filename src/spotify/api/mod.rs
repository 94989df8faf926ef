use std::time::Duration;

use reqwest::StatusCode;

use crate::error::Error;
use crate::query;
use crate::spotify::CredentialSet;

pub use response::{CurrentlyPlaying, ItemKind, NowPlaying, Song};

pub mod response;

pub const SCANNABLES_URL: &str = "https://scannables.scdn.co/uri/plain/png/000000/white/1024";

/// Read-only client for the Web API endpoints the widget needs
#[derive(Debug, Clone)]
pub struct Spotify {
    client: reqwest::Client,
    base: String,
    scannables: String,
}

impl Spotify {
    pub fn new<S: Into<String>>(base: S, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base: base.into(),
            scannables: SCANNABLES_URL.to_string(),
        })
    }

    pub fn with_scannables<S: Into<String>>(mut self, base: S) -> Self {
        self.scannables = base.into();
        self
    }

    /// Scannable code image for a Spotify uri
    pub fn scannable_url(&self, uri: &str) -> String {
        format!("{}/{uri}", self.scannables)
    }

    /// Get the track or episode playing on the account the credentials belong to
    ///
    /// Anything other than a `200` with an item is reported as nothing playing.
    pub async fn currently_playing(&self, credentials: &CredentialSet) -> Result<Option<NowPlaying>, Error> {
        let url = query!(format!("{}/me/player/currently-playing", self.base); additional_types = "episode");
        let response = self
            .client
            .get(url)
            .header("Authorization", credentials.to_header())
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                let jd = &mut serde_json::Deserializer::from_str(&body);
                let playing: CurrentlyPlaying =
                    serde_path_to_error::deserialize(jd).map_err(|e| Error::Json(e.to_string()))?;
                Ok(playing.now_playing())
            }
            StatusCode::NO_CONTENT => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<response::ErrorBody>(&body) {
                    Ok(err) => log::warn!("currently-playing [{}]: {}", err.error.status, err.error.message),
                    Err(_) => log::warn!("currently-playing [{status}]"),
                }
                Ok(None)
            }
        }
    }

    /// Fetch raw bytes, used for cover art and scannable codes
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
