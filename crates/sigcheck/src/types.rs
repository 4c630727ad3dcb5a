//! Data model shared by the transport, the verifiers and the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::sha256_digest;
use crate::error::{VerifyError, VerifyResult};

/// Content descriptor of an artifact or signature manifest.
///
/// Two descriptors are equal only if digest, media type and size all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    /// Media type (e.g., "application/vnd.oci.image.manifest.v1+json").
    #[serde(rename = "mediaType")]
    pub media_type: String,

    /// Content digest (`sha256:...` or `sha512:...`).
    pub digest: String,

    /// Size in bytes.
    pub size: u64,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
        }
    }

    /// Describe in-memory content, computing its SHA-256 digest.
    pub fn from_content(media_type: impl Into<String>, content: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: sha256_digest(content),
            size: content.len() as u64,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} bytes)", self.digest, self.media_type, self.size)
    }
}

/// Detached signature envelope, logical shape only.
///
/// The outer encoding belongs to whoever produced the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEnvelope {
    /// Signature scheme name (e.g., "x509").
    pub type_tag: String,

    /// DER certificates, leaf first, root-most last.
    pub certificate_chain: Vec<Vec<u8>>,

    /// Algorithm identifier (JWS names: "ES256", "RS256", "EdDSA", ...).
    pub algorithm: String,

    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

/// A signature candidate: the signed bytes and their envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCandidate {
    /// Signed payload (a JSON-encoded [`SignedContent`]).
    pub payload: Vec<u8>,

    /// Envelope carrying the signature over `payload`.
    pub envelope: SignatureEnvelope,
}

impl SignatureCandidate {
    pub fn new(payload: impl Into<Vec<u8>>, envelope: SignatureEnvelope) -> Self {
        Self {
            payload: payload.into(),
            envelope,
        }
    }
}

/// Manifest entry inside [`SignedContent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedManifest {
    #[serde(flatten)]
    pub descriptor: Descriptor,

    /// Original references (e.g., "registry.example/app:v1").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

/// Claims covered by a signature.
///
/// The first manifest is the subject the signature asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedContent {
    /// Issued-at, Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before, Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Expiration, Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    pub manifests: Vec<SignedManifest>,
}

impl SignedContent {
    /// Claims for a single subject, issued and valid from `now`.
    pub fn for_subject(descriptor: Descriptor, now: DateTime<Utc>) -> Self {
        let ts = now.timestamp();
        Self {
            iat: Some(ts),
            nbf: Some(ts),
            exp: None,
            manifests: vec![SignedManifest {
                descriptor,
                references: Vec::new(),
            }],
        }
    }

    /// Set the expiration relative to the issue time.
    pub fn with_expiry(mut self, expiry: chrono::Duration) -> Self {
        let base = self.iat.unwrap_or_else(|| Utc::now().timestamp());
        self.exp = Some(base.saturating_add(expiry.num_seconds()));
        self
    }

    /// Attach original references to the subject manifest.
    pub fn with_references(mut self, references: Vec<String>) -> Self {
        if let Some(first) = self.manifests.first_mut() {
            first.references = references;
        }
        self
    }

    /// Decode claims from signed payload bytes.
    pub fn from_payload(payload: &[u8]) -> VerifyResult<Self> {
        serde_json::from_slice(payload).map_err(|e| VerifyError::InvalidPayload {
            reason: e.to_string(),
        })
    }

    /// Encode claims as payload bytes.
    pub fn to_payload(&self) -> Vec<u8> {
        // Serializing plain structs with string keys does not fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// The descriptor asserted by these claims.
    pub fn subject(&self) -> VerifyResult<&Descriptor> {
        self.manifests
            .first()
            .map(|m| &m.descriptor)
            .ok_or_else(|| VerifyError::InvalidPayload {
                reason: "signed content lists no manifests".to_string(),
            })
    }

    /// Check `nbf`/`exp` against `now`.
    pub fn check_time(&self, now: DateTime<Utc>) -> VerifyResult<()> {
        let now = now.timestamp();
        if let Some(not_before) = self.nbf {
            if now < not_before {
                return Err(VerifyError::NotYetValid { not_before });
            }
        }
        if let Some(expires_at) = self.exp {
            if now >= expires_at {
                return Err(VerifyError::Expired { expires_at });
            }
        }
        Ok(())
    }
}

/// Registry client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Basic-auth username; empty means anonymous.
    #[serde(default)]
    pub username: String,

    /// Basic-auth password.
    #[serde(default)]
    pub password: String,

    /// Talk plain HTTP instead of HTTPS.
    #[serde(default)]
    pub plain_http: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            plain_http: false,
            timeout_secs: default_timeout(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SIGCHECK_REGISTRY_USERNAME` | Basic-auth username |
    /// | `SIGCHECK_REGISTRY_PASSWORD` | Basic-auth password |
    /// | `SIGCHECK_PLAIN_HTTP` | Use plain HTTP (`1` or `true`) |
    /// | `SIGCHECK_REGISTRY_TIMEOUT` | Request timeout in seconds |
    pub fn from_env() -> Self {
        Self {
            username: std::env::var("SIGCHECK_REGISTRY_USERNAME").unwrap_or_default(),
            password: std::env::var("SIGCHECK_REGISTRY_PASSWORD").unwrap_or_default(),
            plain_http: std::env::var("SIGCHECK_PLAIN_HTTP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            timeout_secs: std::env::var("SIGCHECK_REGISTRY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Use plain HTTP.
    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
