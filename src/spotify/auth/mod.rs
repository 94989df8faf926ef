use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::Error;

use super::CredentialSet;

pub use refresher::{CredentialHandle, RefreshOutcome, RefreshState, RefresherOptions, TokenRefresher};

mod refresher;

/// The two ways a credential set can be exchanged for a new access token.
///
/// Once the set holds a refresh token the authorization code is never sent again.
#[derive(Debug, Clone, PartialEq)]
pub enum Grant<'a> {
    AuthorizationCode { code: &'a str, redirect_uri: &'a str },
    RefreshToken { refresh_token: &'a str },
}

impl<'a> Grant<'a> {
    pub fn for_credentials(credentials: &'a CredentialSet) -> Self {
        match credentials.refresh_token.as_deref() {
            Some(refresh_token) => Grant::RefreshToken { refresh_token },
            None => Grant::AuthorizationCode {
                code: &credentials.access_token,
                redirect_uri: &credentials.redirect_url,
            },
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// `application/x-www-form-urlencoded` request body
    pub fn to_form(&self) -> Result<String, serde_urlencoded::ser::Error> {
        match self {
            Grant::AuthorizationCode { code, redirect_uri } => serde_urlencoded::to_string([
                ("grant_type", self.grant_type()),
                ("code", *code),
                ("redirect_uri", *redirect_uri),
            ]),
            Grant::RefreshToken { refresh_token } => serde_urlencoded::to_string([
                ("grant_type", self.grant_type()),
                ("refresh_token", *refresh_token),
            ]),
        }
    }
}

/// Successful body of the token endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn parse(body: &str) -> Result<Self, Error> {
        let jd = &mut serde_json::Deserializer::from_str(body);
        let token: TokenResponse = serde_path_to_error::deserialize(jd).map_err(|e| Error::Exchange {
            status: None,
            message: format!("malformed token response: {e}"),
            body: Some(body.to_string()),
        })?;

        if token.access_token.is_empty() {
            return Err(Error::Exchange {
                status: None,
                message: "token response has an empty access_token".to_string(),
                body: Some(body.to_string()),
            });
        }
        Ok(token)
    }

    /// Apply the response to a copy of `credentials`. A missing refresh token
    /// keeps the stored one.
    pub fn apply(self, credentials: &CredentialSet) -> CredentialSet {
        let mut updated = credentials.clone();
        updated.access_token = self.access_token;
        if let Some(refresh_token) = self.refresh_token.filter(|t| !t.is_empty()) {
            updated.refresh_token = Some(refresh_token);
        }
        updated
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Message for a failed exchange, preferring the provider's own description.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    }
}

/// Client for the account service's token endpoint
#[derive(Debug, Clone)]
pub struct TokenClient {
    client: reqwest::Client,
    endpoint: String,
}

impl TokenClient {
    pub fn new<S: Into<String>>(endpoint: S, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Perform one exchange for `credentials`. Every failure, including a
    /// timeout, comes back as [`Error::Exchange`].
    pub async fn exchange(&self, credentials: &CredentialSet) -> Result<TokenResponse, Error> {
        let grant = Grant::for_credentials(credentials);
        let body = grant.to_form().map_err(Error::exchange)?;

        log::debug!("requesting token with grant_type={}", grant.grant_type());
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Authorization", format!("Basic {}", credentials.basic_auth()))
            .body(body)
            .send()
            .await
            .map_err(Error::exchange)?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Exchange {
            status: Some(status.as_u16()),
            message: e.to_string(),
            body: None,
        })?;

        if !status.is_success() {
            return Err(Error::Exchange {
                status: Some(status.as_u16()),
                message: error_message(status, &body),
                body: Some(body),
            });
        }

        TokenResponse::parse(&body).map_err(|err| match err {
            Error::Exchange { message, body, .. } => Error::Exchange {
                status: Some(status.as_u16()),
                message,
                body,
            },
            other => other,
        })
    }
}
