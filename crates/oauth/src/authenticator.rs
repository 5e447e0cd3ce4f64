use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use {
    secrecy::Secret,
    tracing::{debug, info, warn},
    xurl_common::{AuthError, Result},
    xurl_config::XurlConfig,
    xurl_store::CredentialStore,
};

use crate::{
    callback_server::CallbackServer,
    flow::OAuth2Flow,
    oauth1::{self, OAuth1Secrets, SigningInput},
    pkce::{generate_pkce, generate_state},
    scopes::SCOPES,
    types::{OAuth2Config, now_secs},
};

/// How long the authorization flow waits for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Opens the authorization URL for the user.
pub type BrowserLauncher = Box<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Which credential kind a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthKind {
    /// Probe OAuth2, then OAuth1, then bearer.
    #[default]
    Unspecified,
    Bearer,
    OAuth1,
    OAuth2,
}

impl FromStr for AuthKind {
    type Err = AuthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Self::Unspecified),
            "oauth1" => Ok(Self::OAuth1),
            "oauth2" => Ok(Self::OAuth2),
            "app" | "bearer" => Ok(Self::Bearer),
            other => Err(AuthError::InvalidAuthType(other.to_string())),
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::Bearer => "app",
            Self::OAuth1 => "oauth1",
            Self::OAuth2 => "oauth2",
        })
    }
}

/// Produces `Authorization` header values from stored credentials, running
/// the OAuth2 flow or a refresh when needed and persisting the result.
pub struct Authenticator {
    store: CredentialStore,
    config: XurlConfig,
    app: Option<String>,
    http: reqwest::Client,
    browser: BrowserLauncher,
    callback_timeout: Duration,
}

impl Authenticator {
    pub fn new(config: &XurlConfig, store: CredentialStore) -> Self {
        Self {
            store,
            app: config.app_name.clone(),
            config: config.clone(),
            http: reqwest::Client::new(),
            browser: Box::new(|url: &str| open::that(url)),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    /// Target a specific app instead of the store default.
    pub fn with_app(mut self, app: Option<String>) -> Self {
        self.app = app.filter(|a| !a.is_empty());
        self
    }

    pub fn with_browser(mut self, browser: BrowserLauncher) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore {
        &mut self.store
    }

    /// Client id and secret: ambient configuration first, then the app.
    fn client_credentials(&self) -> (String, Option<String>) {
        let app = self.store.find_app(self.app.as_deref());
        let client_id = self
            .config
            .client_id
            .clone()
            .or_else(|| app.map(|a| a.client_id.clone()))
            .unwrap_or_default();
        let client_secret = self
            .config
            .client_secret_str()
            .map(str::to_string)
            .or_else(|| app.map(|a| a.client_secret.clone()))
            .filter(|s| !s.is_empty());
        (client_id, client_secret)
    }

    fn flow(&self) -> OAuth2Flow {
        let (client_id, client_secret) = self.client_credentials();
        let config = OAuth2Config {
            client_id,
            client_secret: client_secret.map(Secret::new),
            auth_url: self.config.auth_url.clone(),
            token_url: self.config.token_url.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            info_url: self.config.info_url(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        };
        OAuth2Flow::new(config, self.http.clone())
    }

    // ── Header resolution ───────────────────────────────────────────────────

    /// The `Authorization` value for one request.
    ///
    /// An explicit kind goes straight to that mechanism. `Unspecified` tries
    /// a stored OAuth2 token, then OAuth1, then bearer, and never starts an
    /// interactive flow.
    pub async fn authorization_header(
        &mut self,
        kind: AuthKind,
        method: &str,
        url: &str,
        username: Option<&str>,
    ) -> Result<String> {
        match kind {
            AuthKind::OAuth1 => self.oauth1_header(method, url),
            AuthKind::OAuth2 => self.oauth2_header(username).await,
            AuthKind::Bearer => self.bearer_header(),
            AuthKind::Unspecified => self.probe(method, url, username).await,
        }
    }

    async fn probe(&mut self, method: &str, url: &str, username: Option<&str>) -> Result<String> {
        let app = self.app.clone();
        if self.store.has_oauth2_token(app.as_deref()) {
            match self.oauth2_header(username).await {
                Ok(header) => return Ok(header),
                Err(e) => warn!(error = %e, "oauth2 credential unusable, trying oauth1"),
            }
        }
        if self.store.has_oauth1_token(app.as_deref()) {
            match self.oauth1_header(method, url) {
                Ok(header) => return Ok(header),
                Err(e) => warn!(error = %e, "oauth1 credential unusable, trying bearer"),
            }
        }
        if self.store.has_bearer_token(app.as_deref()) {
            return self.bearer_header();
        }
        Err(AuthError::NoAuthMethod.into())
    }

    pub fn oauth1_header(&self, method: &str, url: &str) -> Result<String> {
        let token = self
            .store
            .oauth1_token(self.app.as_deref())
            .ok_or_else(|| AuthError::TokenNotFound("OAuth1".into()))?;
        let header = oauth1::authorization_header(
            method,
            url,
            &BTreeMap::new(),
            OAuth1Secrets::from(token),
            &SigningInput::fresh(),
        )?;
        Ok(header)
    }

    pub fn bearer_header(&self) -> Result<String> {
        let token = self
            .store
            .bearer_token(self.app.as_deref())
            .ok_or_else(|| AuthError::TokenNotFound("bearer".into()))?;
        Ok(format!("Bearer {token}"))
    }

    /// Refresh the stored OAuth2 token if it exists, otherwise authorize.
    pub async fn oauth2_header(&mut self, username: Option<&str>) -> Result<String> {
        let app = self.app.clone();
        let stored = match username {
            Some(user) => self.store.oauth2_token(app.as_deref(), user).is_some(),
            None => self.store.has_oauth2_token(app.as_deref()),
        };
        if !stored {
            return self.authorize(username).await;
        }
        let access_token = self.refresh_oauth2_token(username).await?;
        Ok(format!("Bearer {access_token}"))
    }

    // ── OAuth2 ──────────────────────────────────────────────────────────────

    /// Run the browser authorization flow and store the resulting token.
    /// Returns the `Bearer ...` header value.
    pub async fn authorize(&mut self, username: Option<&str>) -> Result<String> {
        let flow = self.flow();
        let pkce = generate_pkce();
        let state = generate_state();
        let auth_url = flow.authorization_url(&state, &pkce)?;

        let server = CallbackServer::bind(self.config.callback_port(), &state).await?;
        info!(port = server.port(), "opening browser for oauth2 authorization");
        if let Err(e) = (self.browser)(&auth_url) {
            warn!(error = %e, "failed to open browser");
            eprintln!("Failed to open browser automatically. Please visit this URL manually:");
            eprintln!("{auth_url}");
        }

        let code = server.wait(self.callback_timeout).await?;
        let tokens = flow.exchange_code(&code, &pkce.verifier).await?;
        let username = match username {
            Some(user) => user.to_string(),
            None => flow.fetch_username(&tokens.access_token).await?,
        };

        let app = self.app.clone();
        self.store.save_oauth2_token(
            app.as_deref(),
            &username,
            &tokens.access_token,
            tokens.refresh_token.as_deref().unwrap_or_default(),
            tokens.expires_at(now_secs()),
        )?;
        info!(username = %username, "oauth2 token stored");
        Ok(format!("Bearer {}", tokens.access_token))
    }

    /// Return a valid access token, refreshing it first when it has expired.
    ///
    /// A refresh that fails is reported as [`AuthError::RefreshToken`] and is
    /// not retried.
    pub async fn refresh_oauth2_token(&mut self, username: Option<&str>) -> Result<String> {
        let app = self.app.clone();
        let token = match username {
            Some(user) => self.store.oauth2_token(app.as_deref(), user),
            None => self
                .store
                .first_oauth2_token(app.as_deref())
                .map(|(_, token)| token),
        }
        .cloned()
        .ok_or_else(|| AuthError::TokenNotFound("OAuth2".into()))?;

        if now_secs() < token.expiration_time {
            debug!("oauth2 token still valid");
            return Ok(token.access_token);
        }

        let flow = self.flow();
        let fresh = flow.refresh(&token.refresh_token).await?;
        let username = match username {
            Some(user) => user.to_string(),
            None => flow.fetch_username(&fresh.access_token).await?,
        };
        let refresh_token = fresh
            .refresh_token
            .clone()
            .unwrap_or(token.refresh_token);

        self.store.save_oauth2_token(
            app.as_deref(),
            &username,
            &fresh.access_token,
            &refresh_token,
            fresh.expires_at(now_secs()),
        )?;
        debug!(username = %username, "oauth2 token refreshed");
        Ok(fresh.access_token)
    }
}
