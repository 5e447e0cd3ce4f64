use std::time::{SystemTime, UNIX_EPOCH};

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Endpoints and client credentials for the authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    /// Profile endpoint answering `{"data":{"username":...}}`.
    pub info_url: String,
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    pub(crate) fn client_secret_str(&self) -> Option<&str> {
        self.client_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

/// Token endpoint answer for both the code and the refresh grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Absolute expiry in seconds since the Unix epoch.
    pub fn expires_at(&self, now: u64) -> u64 {
        now + self.expires_in.unwrap_or(0)
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
