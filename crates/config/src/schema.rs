use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";
pub const DEFAULT_AUTH_URL: &str = "https://x.com/i/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.x.com/2/oauth2/token";
pub const DEFAULT_API_BASE_URL: &str = "https://api.x.com";

/// Port used for the OAuth2 callback when the redirect URI names none.
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

/// Process-wide configuration, built once in `main` and passed down by
/// reference. Library code never reads the environment on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XurlConfig {
    /// Ambient OAuth2 client id. Takes priority over the id stored on an app.
    pub client_id: Option<String>,
    /// Ambient OAuth2 client secret. Takes priority over the stored secret.
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base_url: String,
    /// Profile endpoint; defaults to `{api_base_url}/2/users/me`.
    pub info_url: Option<String>,
    /// Explicit app override (`--app`).
    pub app_name: Option<String>,
    /// Credential store location; defaults to `~/.xurl`.
    pub store_path: Option<PathBuf>,
    /// Foreign credential file imported at startup; defaults to `~/.twurlrc`.
    pub twurlrc_path: Option<PathBuf>,
}

impl Default for XurlConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.into(),
            auth_url: DEFAULT_AUTH_URL.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            info_url: None,
            app_name: None,
            store_path: None,
            twurlrc_path: None,
        }
    }
}

impl XurlConfig {
    /// Build a config from defaults plus the given variables.
    pub fn from_env_map(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_env(lookup);
        config
    }

    /// Override fields from `CLIENT_ID`, `CLIENT_SECRET`, `REDIRECT_URI`,
    /// `AUTH_URL`, `TOKEN_URL`, `API_BASE_URL` and `INFO_URL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CLIENT_ID").filter(|v| !v.is_empty()) {
            self.client_id = Some(v);
        }
        if let Some(v) = lookup("CLIENT_SECRET").filter(|v| !v.is_empty()) {
            self.client_secret = Some(Secret::new(v));
        }
        if let Some(v) = lookup("REDIRECT_URI") {
            self.redirect_uri = v;
        }
        if let Some(v) = lookup("AUTH_URL") {
            self.auth_url = v;
        }
        if let Some(v) = lookup("TOKEN_URL") {
            self.token_url = v;
        }
        if let Some(v) = lookup("API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("INFO_URL") {
            self.info_url = Some(v);
        }
    }

    pub fn info_url(&self) -> String {
        match &self.info_url {
            Some(url) => url.clone(),
            None => format!("{}/2/users/me", self.api_base_url.trim_end_matches('/')),
        }
    }

    pub fn client_secret_str(&self) -> Option<&str> {
        self.client_secret.as_ref().map(|s| s.expose_secret().as_str())
    }

    /// The callback port (parsed from `redirect_uri`).
    pub fn callback_port(&self) -> u16 {
        url::Url::parse(&self.redirect_uri)
            .ok()
            .and_then(|u| u.port())
            .unwrap_or(DEFAULT_CALLBACK_PORT)
    }

    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| crate::loader::home_file(".xurl"))
    }

    pub fn resolved_twurlrc_path(&self) -> PathBuf {
        self.twurlrc_path
            .clone()
            .unwrap_or_else(|| crate::loader::home_file(".twurlrc"))
    }
}
