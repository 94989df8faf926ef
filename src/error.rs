use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use color_eyre::{Report, Section};
pub use color_eyre::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The credential file does not exist
    ConfigMissing { path: PathBuf },
    /// The credential file exists but is unreadable or lacks required fields
    ConfigInvalid { path: PathBuf, reason: String },
    /// No access token and no refresh token: the account was never authorized
    TokenMissing {
        client_id: String,
        redirect_url: String,
        authorization_url: String,
    },
    /// The token endpoint could not be reached or rejected the exchange
    Exchange {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },
    /// Rotated credentials could not be written back to disk
    Persist { path: PathBuf, reason: String },
    /// A card could not be rasterized
    Render(String),
    Http(String),
    Json(String),
    Io(String),
}

impl Error {
    pub fn exchange<S: Display>(message: S) -> Self {
        Error::Exchange {
            status: None,
            message: message.to_string(),
            body: None,
        }
    }

    /// Startup errors are the only ones allowed to stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigMissing { .. } | Error::ConfigInvalid { .. } | Error::TokenMissing { .. }
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConfigMissing { path } => {
                write!(f, "missing credentials file `{}`", path.display())
            }
            Error::ConfigInvalid { path, reason } => {
                write!(f, "invalid credentials file `{}`: {reason}", path.display())
            }
            Error::TokenMissing { client_id, .. } => {
                write!(f, "credentials for client `{client_id}` are missing a token")
            }
            Error::Exchange {
                status: Some(status),
                message,
                ..
            } => write!(f, "token exchange failed [{status}]: {message}"),
            Error::Exchange { message, .. } => write!(f, "token exchange failed: {message}"),
            Error::Persist { path, reason } => {
                write!(f, "failed to persist credentials to `{}`: {reason}", path.display())
            }
            Error::Render(e) => write!(f, "render: {e}"),
            Error::Http(e) => write!(f, "http: {e}"),
            Error::Json(e) => write!(f, "json: {e}"),
            Error::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Http(value.to_string())
    }
}

impl From<Error> for Report {
    fn from(value: Error) -> Self {
        let message = value.to_string();
        match value {
            Error::ConfigMissing { .. } => Report::msg(message)
                .suggestion("Create `credentials.json` with the keys: port, client, secret, token, refreshUrl"),
            Error::ConfigInvalid { .. } => Report::msg(message)
                .suggestion("The credentials file needs non-empty values for: port, client, secret, refreshUrl. \
                    If you registered the app with the default callback use \"http://localhost/callback/\" as refreshUrl"),
            Error::TokenMissing { authorization_url, .. } => Report::msg(message)
                .suggestion(format!(
                    "Authorize the app by following {authorization_url} and paste the `code` query parameter \
                    of the redirect into the `token` field of the credentials file"
                )),
            Error::Exchange { body: Some(body), .. } => Report::msg(message).note(body),
            Error::Persist { .. } => Report::msg(message)
                .suggestion("Check write permissions; the rotated token will be lost on restart"),
            _ => Report::msg(message),
        }
    }
}
