//! Multi-app credential storage with migration from older file formats.

pub mod migrate;
pub mod store;
pub mod types;

pub use {
    store::{AppOrigin, AppResolution, CredentialStore, StoreOptions},
    types::{App, Credential, OAuth1Token, OAuth2Token, StoreDocument},
};
