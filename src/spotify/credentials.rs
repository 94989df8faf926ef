use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::query;

/// Scopes requested when the operator authorizes the app for the first time
pub const SCOPES: &str = "user-read-currently-playing,user-read-recently-played";

/// Raw shape of `credentials.json`. Everything is optional here so validation
/// can report exactly which keys are missing.
#[derive(Default, Deserialize, Serialize)]
struct CredentialsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(rename = "refreshUrl", default, skip_serializing_if = "Option::is_none")]
    refresh_url: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Client and token material for the linked account
#[derive(Clone, PartialEq)]
pub struct CredentialSet {
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub redirect_url: String,
    extra: Map<String, Value>,
}

impl CredentialSet {
    pub fn new<S: Into<String>>(port: u16, client_id: S, client_secret: S, redirect_url: S) -> Self {
        Self {
            port,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: String::new(),
            refresh_token: None,
            redirect_url: redirect_url.into(),
            extra: Map::new(),
        }
    }

    pub fn with_access_token<S: Into<String>>(mut self, token: S) -> Self {
        self.access_token = token.into();
        self
    }

    pub fn with_refresh_token<S: Into<String>>(mut self, token: S) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Value for the `Authorization: Basic` header of the token endpoint
    pub fn basic_auth(&self) -> String {
        let auth = format!("{}:{}", self.client_id, self.client_secret);
        base64::engine::general_purpose::STANDARD.encode(auth.as_bytes())
    }

    /// `Authorization` value for Web API calls made with the cached token
    pub fn to_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    fn validate(path: &Path, file: CredentialsFile) -> Result<Self, Error> {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.is_empty())
        }

        let mut missing = Vec::new();
        if file.port.unwrap_or_default() == 0 {
            missing.push("port");
        }
        if !present(&file.client) {
            missing.push("client");
        }
        if !present(&file.secret) {
            missing.push("secret");
        }
        if !present(&file.refresh_url) {
            missing.push("refreshUrl");
        }
        if !missing.is_empty() {
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                reason: format!("missing {}", missing.join(", ")),
            });
        }

        let client_id = file.client.unwrap_or_default();
        let redirect_url = file.refresh_url.unwrap_or_default();
        let refresh_token = file.refresh_token.filter(|t| !t.is_empty());

        if !present(&file.token) {
            return Err(Error::TokenMissing {
                authorization_url: authorization_url(&client_id, &redirect_url),
                client_id,
                redirect_url,
            });
        }

        Ok(Self {
            port: file.port.unwrap_or_default(),
            client_id,
            client_secret: file.secret.unwrap_or_default(),
            access_token: file.token.unwrap_or_default(),
            refresh_token,
            redirect_url,
            extra: file.extra,
        })
    }

    fn to_file(&self) -> CredentialsFile {
        CredentialsFile {
            port: Some(self.port),
            client: Some(self.client_id.clone()),
            secret: Some(self.client_secret.clone()),
            token: Some(self.access_token.clone()),
            refresh_url: Some(self.redirect_url.clone()),
            refresh_token: self.refresh_token.clone(),
            extra: self.extra.clone(),
        }
    }
}

impl Debug for CredentialSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

pub fn authorization_url(client_id: &str, redirect_url: &str) -> String {
    query!(
        "https://accounts.spotify.com/authorize" ?
        client_id=client_id,
        response_type="code",
        scope=SCOPES,
        redirect_uri=urlencoding::encode(redirect_url),
    )
}

/// Loads and persists the [`CredentialSet`] at a single path
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CredentialSet, Error> {
        if !self.path.exists() {
            return Err(Error::ConfigMissing {
                path: self.path.clone(),
            });
        }

        let invalid = |reason: String| Error::ConfigInvalid {
            path: self.path.clone(),
            reason,
        };

        let content = std::fs::read_to_string(&self.path).map_err(|e| invalid(e.to_string()))?;
        let jd = &mut serde_json::Deserializer::from_str(&content);
        let file: CredentialsFile =
            serde_path_to_error::deserialize(jd).map_err(|e| invalid(e.to_string()))?;

        CredentialSet::validate(&self.path, file)
    }

    /// Write the set to a sibling temp file then rename it over the target,
    /// so readers see either the old file or the new one.
    pub fn persist(&self, credentials: &CredentialSet) -> Result<(), Error> {
        let failed = |reason: String| Error::Persist {
            path: self.path.clone(),
            reason,
        };

        let mut body = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
        credentials
            .to_file()
            .serialize(&mut serializer)
            .map_err(|e| failed(e.to_string()))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "credentials.json".to_string());
        let temp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        if let Err(err) = std::fs::write(&temp, &body) {
            let _ = std::fs::remove_file(&temp);
            return Err(failed(err.to_string()));
        }
        if let Err(err) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(failed(err.to_string()));
        }
        Ok(())
    }
}
