//! Readers for older and foreign credential file formats.

use std::collections::BTreeMap;

use {serde::Deserialize, xurl_common::StoreError};

use crate::types::{App, Credential, OAuth1Token, StoreDocument};

/// Name given to the app synthesized from a legacy single-app document.
pub const LEGACY_APP_NAME: &str = "default";

/// Outcome of parsing the credential file.
#[derive(Debug)]
pub(crate) enum Loaded {
    /// Already in the multi-app format.
    Current(StoreDocument),
    /// Converted from the flat single-app JSON format; must be rewritten.
    Legacy(StoreDocument),
}

/// Flat document written by single-app releases.
#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    oauth2_tokens: BTreeMap<String, Credential>,
    #[serde(default)]
    oauth1_tokens: Option<Credential>,
    #[serde(default)]
    bearer_token: Option<Credential>,
}

/// Parse the credential file, trying the multi-app YAML layout first and the
/// legacy JSON layout when that fails or holds no apps.
pub(crate) fn parse_document(raw: &str) -> Result<Loaded, StoreError> {
    let current = serde_yaml::from_str::<StoreDocument>(raw);
    if let Ok(doc) = &current
        && !doc.apps.is_empty()
    {
        return Ok(Loaded::Current(doc.clone().normalize()));
    }

    match serde_json::from_str::<LegacyDocument>(raw) {
        Ok(legacy) => {
            let app = App {
                oauth2_tokens: legacy.oauth2_tokens,
                oauth1_token: legacy.oauth1_tokens,
                bearer_token: legacy.bearer_token,
                ..App::default()
            };
            let mut doc = StoreDocument::default();
            doc.apps.insert(LEGACY_APP_NAME.to_string(), app);
            doc.default_app = Some(LEGACY_APP_NAME.to_string());
            Ok(Loaded::Legacy(doc))
        },
        // Valid YAML that simply has no apps yet.
        Err(_) if current.is_ok() => Ok(Loaded::Current(StoreDocument::default())),
        Err(json_err) => {
            let yaml_err = current.err().map(|e| e.to_string()).unwrap_or_default();
            Err(StoreError::Migration(format!(
                "not a credential document ({yaml_err}; legacy: {json_err})"
            )))
        },
    }
}

// ── twurlrc ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Twurlrc {
    #[serde(default)]
    profiles: BTreeMap<String, BTreeMap<String, TwurlProfile>>,
    #[serde(default)]
    configuration: TwurlConfiguration,
    #[serde(default)]
    bearer_tokens: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct TwurlConfiguration {
    #[serde(default)]
    default_profile: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TwurlProfile {
    #[serde(default)]
    consumer_secret: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    secret: String,
}

/// Credentials extracted from a twurlrc file.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ForeignCredentials {
    pub oauth1: Option<OAuth1Token>,
    pub bearer: Option<String>,
}

/// Parse a twurlrc document.
///
/// The profile named by `configuration.default_profile` wins; otherwise the
/// first profile in name order. The bearer token registered for the chosen
/// consumer key is preferred over any other.
pub(crate) fn parse_twurlrc(raw: &str) -> Result<ForeignCredentials, StoreError> {
    let rc: Twurlrc =
        serde_yaml::from_str(raw).map_err(|e| StoreError::Migration(format!("twurlrc: {e}")))?;

    let preferred = match rc.configuration.default_profile.as_slice() {
        [screen_name, consumer_key, ..] => rc
            .profiles
            .get(screen_name)
            .and_then(|keys| keys.get_key_value(consumer_key)),
        _ => None,
    };
    let chosen = preferred.or_else(|| {
        rc.profiles
            .values()
            .find_map(|keys| keys.iter().next())
    });

    let oauth1 = chosen.map(|(consumer_key, profile)| OAuth1Token {
        access_token: profile.token.clone(),
        token_secret: profile.secret.clone(),
        consumer_key: consumer_key.clone(),
        consumer_secret: profile.consumer_secret.clone(),
    });
    let bearer = oauth1
        .as_ref()
        .and_then(|t| rc.bearer_tokens.get(&t.consumer_key))
        .or_else(|| rc.bearer_tokens.values().next())
        .cloned();

    Ok(ForeignCredentials { oauth1, bearer })
}
