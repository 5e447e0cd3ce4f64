use {
    tracing::debug,
    url::Url,
    xurl_common::AuthError,
};

use crate::types::{OAuth2Config, PkceChallenge, TokenResponse};

/// Network half of the authorization-code flow with PKCE.
///
/// Holds no credentials beyond the client id/secret; persisting tokens is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct OAuth2Flow {
    config: OAuth2Config,
    http: reqwest::Client,
}

impl OAuth2Flow {
    pub fn new(config: OAuth2Config, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Build the URL the user opens to grant access.
    pub fn authorization_url(&self, state: &str, pkce: &PkceChallenge) -> Result<String, AuthError> {
        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(&self.config.auth_url, &[
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .map_err(|e| {
            AuthError::TokenExchange(format!(
                "invalid authorization URL {}: {e}",
                self.config.auth_url
            ))
        })?;
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("client_id", self.config.client_id.as_str()),
        ])
        .await
        .map_err(AuthError::TokenExchange)
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        debug!("refreshing oauth2 access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ])
        .await
        .map_err(AuthError::RefreshToken)
    }

    /// Look up the username that owns `access_token`.
    pub async fn fetch_username(&self, access_token: &str) -> Result<String, AuthError> {
        let resp = self
            .http
            .get(&self.config.info_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::UsernameFetch(e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AuthError::UsernameFetch(e.to_string()))?;

        body.get("data")
            .and_then(|d| d.get("username"))
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| AuthError::UsernameFetch("username not found in profile response".into()))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let mut req = self.http.post(&self.config.token_url).form(form);
        if let Some(secret) = self.config.client_secret_str() {
            req = req.basic_auth(&self.config.client_id, Some(secret));
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {body}"));
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|e| format!("invalid token response: {e}"))
    }
}
