//! Registry authentication primitives.
//!
//! - Static basic-auth credentials
//! - `Www-Authenticate` challenge parsing
//! - Bearer token response decoding
//!
//! The challenge/response flow itself lives in [`crate::transport`].

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use reqwest::header::HeaderValue;
use serde::Deserialize;

use crate::error::{TransportError, TransportResult};

/// Static username/password pair.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Anonymous access.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Credentials are attached only when a username is set.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// `Authorization: Basic ...` value, or `None` for anonymous access.
    pub fn basic_auth_header(&self) -> TransportResult<Option<HeaderValue>> {
        if self.is_anonymous() {
            return Ok(None);
        }
        let encoded = BASE64.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| {
            TransportError::InvalidHeader {
                message: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parsed `Www-Authenticate` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    /// Lowercased scheme token ("bearer", "basic", ...). Empty for an empty header.
    pub scheme: String,

    /// Lowercased parameter name -> value. Only realm, service and scope are kept.
    pub params: HashMap<String, String>,
}

impl Challenge {
    pub fn is_bearer(&self) -> bool {
        self.scheme == "bearer"
    }

    pub fn realm(&self) -> Option<&str> {
        self.params.get("realm").map(String::as_str)
    }

    pub fn service(&self) -> Option<&str> {
        self.params.get("service").map(String::as_str)
    }

    pub fn scope(&self) -> Option<&str> {
        self.params.get("scope").map(String::as_str)
    }
}

fn challenge_param_regex() -> &'static Regex {
    static PARAM: OnceLock<Regex> = OnceLock::new();
    PARAM.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|[,\s])(realm|service|scope)\s*=\s*"([^"]*)""#)
            .expect("challenge parameter pattern is a valid regex")
    })
}

/// Parse a `Www-Authenticate` header value.
///
/// Unknown parameters and ordering are tolerated. A header without a
/// parameter section yields the scheme with no params; an empty header
/// yields an empty scheme.
pub fn parse_challenge(header: &str) -> Challenge {
    let header = header.trim();
    let (scheme, rest) = match header.split_once(' ') {
        Some((scheme, rest)) => (scheme, Some(rest)),
        None => (header, None),
    };

    let mut params = HashMap::new();
    if let Some(rest) = rest {
        for caps in challenge_param_regex().captures_iter(rest) {
            params.insert(caps[1].to_ascii_lowercase(), caps[2].to_string());
        }
    }

    Challenge {
        scheme: scheme.to_ascii_lowercase(),
        params,
    }
}

/// Token endpoint response body.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
}

impl TokenResponse {
    pub(crate) fn decode(body: &[u8]) -> TransportResult<Self> {
        serde_json::from_slice(body).map_err(|e| TransportError::TokenDecode {
            message: e.to_string(),
        })
    }
}
