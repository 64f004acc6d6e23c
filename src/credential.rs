//! Endpoint resolution from bearer credentials.
//!
//! Credentials are compact JWTs. Their signature is established upstream by
//! the issuing service, so this module only decodes the claims segment and
//! reads the routing claim: the first `aud` entry that is an absolute
//! `http`/`https` URL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Url;
use serde::Deserialize;

use crate::errors::CredentialError;

/// Claims decoded from a credential, unverified. Only the routing claim is
/// read; every other claim is ignored whatever its type.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(default)]
    pub aud: Audience,
}

/// The `aud` claim, which JWTs allow as either a string or a list.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Audience::None => &[],
            Audience::One(value) => std::slice::from_ref(value),
            Audience::Many(values) => values.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

impl Claims {
    /// The tenant's API base URL, taken from the audience.
    pub fn events_url(&self) -> Result<Url, CredentialError> {
        self.aud
            .iter()
            .filter_map(|aud| Url::parse(aud.trim()).ok())
            .find(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .ok_or(CredentialError::MissingRoutingClaim)
    }
}

/// Strip whitespace and an optional `Bearer ` prefix.
pub(crate) fn normalize(credential: &str) -> &str {
    let trimmed = credential.trim();
    trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Decode the claims segment of a compact JWT without verifying it.
pub fn decode_claims(credential: &str) -> Result<Claims, CredentialError> {
    let token = normalize(credential);
    if token.is_empty() {
        return Err(CredentialError::Empty);
    }

    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(CredentialError::Malformed(
            "expected three dot-separated segments".into(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| CredentialError::Malformed(format!("claims are not base64url: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CredentialError::Malformed(format!("claims are not a JSON object: {err}")))
}

/// Resolve the API base URL a credential is routed to.
pub fn resolve_base_url(credential: &str) -> Result<Url, CredentialError> {
    decode_claims(credential)?.events_url()
}
