//! Error taxonomy shared by every xurl crate.
//!
//! Each failure keeps its kind all the way up to the binary: an expired
//! session, a bad request and a network outage are different variants and
//! are never folded into one another.

/// Failures while obtaining or applying credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth not set")]
    AuthNotSet,
    #[error("invalid auth type: {0}")]
    InvalidAuthType(String),
    #[error("{0} token not found")]
    TokenNotFound(String),
    #[error("invalid state parameter")]
    InvalidState,
    #[error("empty authorization code")]
    InvalidCode,
    #[error("authentication timed out")]
    Timeout,
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("refresh token failed: {0}")]
    RefreshToken(String),
    #[error("signature generation failed: {0}")]
    SignatureGeneration(String),
    #[error("no authentication method available")]
    NoAuthMethod,
    #[error("failed to fetch username: {0}")]
    UsernameFetch(String),
    #[error("oauth callback listener failed: {0}")]
    Listener(String),
}

/// Failures raised by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("app {0:?} already exists")]
    DuplicateApp(String),
    #[error("app {0:?} not found")]
    AppNotFound(String),
    #[error("user {user:?} not found in app {app:?}")]
    UserNotFound { app: String, user: String },
    #[error("failed to parse credential file: {0}")]
    Migration(String),
    #[error("failed to serialize credential store: {0}")]
    Serialize(String),
}

/// Failures of the media upload protocol that are not transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media ID not set, call init first")]
    MissingMediaId,
    #[error("{0} is not a regular file")]
    NotAFile(String),
    #[error("media processing failed")]
    ProcessingFailed(serde_json::Value),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Media(#[from] MediaError),
    /// Transport failure or an error status whose body is not JSON.
    #[error("HTTP error: {0}")]
    Http(String),
    /// The API answered with a structured error payload.
    #[error("API error: {0}")]
    Api(serde_json::Value),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl Error {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// The structured payload of an [`Error::Api`], if this is one.
    pub fn api_payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Api(payload) => Some(payload),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
