//! Authorization for X API requests: OAuth1 signing, the OAuth2 PKCE flow
//! with its local callback receiver, and the resolver that picks a stored
//! credential for each request.

pub mod authenticator;
pub mod callback_server;
pub mod flow;
pub mod oauth1;
pub mod pkce;
pub mod scopes;
pub mod types;

pub use {
    authenticator::{AuthKind, Authenticator, BrowserLauncher},
    callback_server::CallbackServer,
    flow::OAuth2Flow,
    types::{OAuth2Config, PkceChallenge, TokenResponse},
};
