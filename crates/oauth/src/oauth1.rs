//! OAuth 1.0a request signing (HMAC-SHA1).

use std::collections::BTreeMap;

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    hmac::{Hmac, Mac},
    rand::{Rng, distr::Alphanumeric},
    sha1::Sha1,
    url::{Position, Url},
    urlencoding::encode,
    xurl_common::AuthError,
    xurl_store::OAuth1Token,
};

use crate::types::now_secs;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// Consumer and token secrets for one signing identity.
#[derive(Debug, Clone, Copy)]
pub struct OAuth1Secrets<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub access_token: &'a str,
    pub token_secret: &'a str,
}

impl<'a> From<&'a OAuth1Token> for OAuth1Secrets<'a> {
    fn from(token: &'a OAuth1Token) -> Self {
        Self {
            consumer_key: &token.consumer_key,
            consumer_secret: &token.consumer_secret,
            access_token: &token.access_token,
            token_secret: &token.token_secret,
        }
    }
}

/// The per-request values that make a signature unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInput {
    pub nonce: String,
    pub timestamp: u64,
}

impl SigningInput {
    /// A random nonce and the current time.
    pub fn fresh() -> Self {
        let nonce = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self {
            nonce,
            timestamp: now_secs(),
        }
    }
}

/// Compute the base64 HMAC-SHA1 signature of a request.
///
/// `params` is merged over the URL's own query parameters. The base string
/// uses the URL without its query.
pub fn signature(
    method: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, AuthError> {
    let parsed = Url::parse(url)
        .map_err(|e| AuthError::SignatureGeneration(format!("invalid URL {url}: {e}")))?;
    let base_url = &parsed[..Position::AfterPath];

    let mut all: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in parsed.query_pairs() {
        all.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    all.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut encoded: Vec<(String, String)> = all
        .iter()
        .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned()))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(base_url),
        encode(&param_string)
    );
    let signing_key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
        .map_err(|e| AuthError::SignatureGeneration(e.to_string()))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Build the `OAuth ...` authorization header value for a request.
pub fn authorization_header(
    method: &str,
    url: &str,
    extra: &BTreeMap<String, String>,
    secrets: OAuth1Secrets<'_>,
    input: &SigningInput,
) -> Result<String, AuthError> {
    let timestamp = input.timestamp.to_string();
    let protocol = [
        ("oauth_consumer_key", secrets.consumer_key),
        ("oauth_nonce", input.nonce.as_str()),
        ("oauth_signature_method", SIGNATURE_METHOD),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", secrets.access_token),
        ("oauth_version", OAUTH_VERSION),
    ];

    let mut params = extra.clone();
    params.extend(protocol.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let sig = signature(
        method,
        url,
        &params,
        secrets.consumer_secret,
        secrets.token_secret,
    )?;

    let mut fields: Vec<(&str, &str)> = protocol.to_vec();
    fields.push(("oauth_signature", sig.as_str()));
    fields.sort_by_key(|(k, _)| *k);

    let rendered = fields
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSUMER_SECRET: &str = "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw";
    const TOKEN_SECRET: &str = "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE";

    fn secrets() -> OAuth1Secrets<'static> {
        OAuth1Secrets {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog",
            consumer_secret: CONSUMER_SECRET,
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            token_secret: TOKEN_SECRET,
        }
    }

    fn input() -> SigningInput {
        SigningInput {
            nonce: "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".into(),
            timestamp: 1_318_622_958,
        }
    }

    fn status_param() -> BTreeMap<String, String> {
        BTreeMap::from([(
            "status".to_string(),
            "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
        )])
    }

    #[test]
    fn known_signature() {
        let url = "https://api.twitter.com/1.1/statuses/update.json?include_entities=true";
        let header =
            authorization_header("post", url, &status_param(), secrets(), &input()).unwrap();
        assert!(header.contains(r#"oauth_signature="hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D""#));
    }

    #[test]
    fn header_structure() {
        let header = authorization_header(
            "GET",
            "https://api.x.com/2/users/me?user.fields=created_at",
            &BTreeMap::new(),
            secrets(),
            &SigningInput::fresh(),
        )
        .unwrap();

        assert!(header.starts_with("OAuth "));
        let fields: Vec<&str> = header["OAuth ".len()..].split(", ").collect();
        let names: Vec<&str> = fields
            .iter()
            .map(|f| f.split('=').next().unwrap())
            .collect();
        assert_eq!(names, [
            "oauth_consumer_key",
            "oauth_nonce",
            "oauth_signature",
            "oauth_signature_method",
            "oauth_timestamp",
            "oauth_token",
            "oauth_version",
        ]);
        assert!(
            fields
                .iter()
                .all(|f| f.ends_with('"') && f.contains("=\""))
        );
    }

    #[test]
    fn fixed_input_is_reproducible() {
        let url = "https://api.x.com/2/tweets";
        let a = authorization_header("POST", url, &BTreeMap::new(), secrets(), &input()).unwrap();
        let b = authorization_header("POST", url, &BTreeMap::new(), secrets(), &input()).unwrap();
        assert_eq!(a, b);

        let other = SigningInput {
            nonce: "different".into(),
            ..input()
        };
        let c = authorization_header("POST", url, &BTreeMap::new(), secrets(), &other).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn query_parameters_are_signed() {
        let params = BTreeMap::new();
        let with_query = signature("GET", "https://api.x.com/2/tweets?ids=1", &params, "c", "t");
        let without = signature("GET", "https://api.x.com/2/tweets", &params, "c", "t");
        assert_ne!(with_query.unwrap(), without.unwrap());
    }

    #[test]
    fn invalid_url_fails() {
        let err = signature("GET", "not a url", &BTreeMap::new(), "c", "t").unwrap_err();
        assert!(matches!(err, AuthError::SignatureGeneration(_)));
    }
}
