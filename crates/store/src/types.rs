use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A stored access credential.
///
/// Serialized internally tagged with the payload under a key named after the
/// variant, e.g. `{type: bearer, bearer: AAAA}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credential {
    Bearer { bearer: String },
    OAuth2 { oauth2: OAuth2Token },
    OAuth1 { oauth1: OAuth1Token },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Expiry in seconds since the Unix epoch.
    #[serde(default)]
    pub expiration_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth1Token {
    pub access_token: String,
    pub token_secret: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            bearer: token.into(),
        }
    }

    pub fn oauth2(token: OAuth2Token) -> Self {
        Self::OAuth2 { oauth2: token }
    }

    pub fn oauth1(token: OAuth1Token) -> Self {
        Self::OAuth1 { oauth1: token }
    }

    pub fn as_bearer(&self) -> Option<&str> {
        match self {
            Self::Bearer { bearer } => Some(bearer),
            _ => None,
        }
    }

    pub fn as_oauth2(&self) -> Option<&OAuth2Token> {
        match self {
            Self::OAuth2 { oauth2 } => Some(oauth2),
            _ => None,
        }
    }

    pub fn as_oauth1(&self) -> Option<&OAuth1Token> {
        match self {
            Self::OAuth1 { oauth1 } => Some(oauth1),
            _ => None,
        }
    }
}

/// A registered application and the tokens obtained under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_user: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub oauth2_tokens: BTreeMap<String, Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth1_token: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<Credential>,
}

impl App {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// Whether any credential of any kind is stored.
    pub fn has_credentials(&self) -> bool {
        !self.oauth2_tokens.is_empty() || self.oauth1_token.is_some() || self.bearer_token.is_some()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer_token.as_ref().and_then(Credential::as_bearer)
    }

    pub fn oauth1(&self) -> Option<&OAuth1Token> {
        self.oauth1_token.as_ref().and_then(Credential::as_oauth1)
    }

    pub fn oauth2(&self, username: &str) -> Option<&OAuth2Token> {
        self.oauth2_tokens
            .get(username)
            .and_then(Credential::as_oauth2)
    }

    /// The default user's token if it is still stored, otherwise the first
    /// user in name order.
    pub fn first_oauth2(&self) -> Option<(&str, &OAuth2Token)> {
        if let Some(user) = self.default_user.as_deref()
            && let Some(token) = self.oauth2(user)
        {
            return Some((user, token));
        }
        self.oauth2_tokens
            .iter()
            .find_map(|(user, cred)| cred.as_oauth2().map(|t| (user.as_str(), t)))
    }

    /// Drop empty pointers left by documents written with blank strings.
    pub(crate) fn normalize(&mut self) {
        if self.default_user.as_deref().is_some_and(str::is_empty) {
            self.default_user = None;
        }
    }
}

/// The on-disk layout of the credential store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub apps: BTreeMap<String, App>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_app: Option<String>,
}

impl StoreDocument {
    pub(crate) fn normalize(mut self) -> Self {
        if self.default_app.as_deref().is_some_and(str::is_empty) {
            self.default_app = None;
        }
        self.apps.values_mut().for_each(App::normalize);
        self
    }
}
