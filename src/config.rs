use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::spotify::auth::RefresherOptions;
use crate::spotify::{API_URL, TOKEN_URL};

/// Serve what the linked Spotify account is playing as JSON or as an SVG card.
///
/// The listen port, client id and secret come from the credentials file.
#[derive(Debug, Clone, Parser)]
#[command(name = "nowplaying", version)]
pub struct Config {
    /// Credentials file; rotated tokens are written back to it
    #[arg(long, env = "NOWPLAYING_CREDENTIALS", default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Append-only log of failed token exchanges
    #[arg(long, env = "NOWPLAYING_LOG_FILE", default_value = "messages.log")]
    pub log_file: PathBuf,

    /// Directory holding playing.svg, nothing.svg and the icons
    #[arg(long, env = "NOWPLAYING_TEMPLATES", default_value = "templates")]
    pub templates: PathBuf,

    #[arg(long, env = "NOWPLAYING_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Seconds between token refreshes
    #[arg(long, env = "NOWPLAYING_INTERVAL", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Seconds before an outbound request is abandoned
    #[arg(long, env = "NOWPLAYING_TIMEOUT", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    #[arg(long, env = "NOWPLAYING_TOKEN_URL", default_value = TOKEN_URL)]
    pub token_url: String,

    #[arg(long, env = "NOWPLAYING_API_URL", default_value = API_URL)]
    pub api_url: String,
}

impl Config {
    /// Parse the command line after loading an optional `.env` file
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Config::parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn refresher(&self) -> RefresherOptions {
        RefresherOptions {
            token_url: self.token_url.clone(),
            interval: Duration::from_secs(self.interval),
            timeout: self.timeout(),
        }
    }
}
