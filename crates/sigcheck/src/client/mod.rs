//! Registry client for resolving and fetching manifests.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.
//! Every request goes through the bearer-token [`AuthTransport`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::Credentials;
use crate::digest::{algorithm_of, digest_with};
use crate::error::{ClientError, ClientResult};
use crate::reference::ArtifactRef;
use crate::transport::{AuthTransport, BearerAuthLayer, TransportLayer};
use crate::types::{ClientConfig, Descriptor};

mod http;

use http::{HttpBackend, ManifestHeaders};

/// User agent sent on every registry request.
pub const REGISTRY_USER_AGENT: &str = concat!("sigcheck/", env!("CARGO_PKG_VERSION"));

/// Registry client for manifest lookups.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: HttpBackend,
}

impl RegistryClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(REGISTRY_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ClientError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let credentials = Credentials::new(&config.username, &config.password);
        if config.username.is_empty() && !config.password.is_empty() {
            debug!("password configured without username, requests stay anonymous");
        }

        Ok(Self {
            http: HttpBackend {
                transport: BearerAuthLayer::new(credentials).layer(client),
                plain_http: config.plain_http,
            },
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// The authenticating transport used for every request.
    pub fn transport(&self) -> &AuthTransport<reqwest::Client> {
        &self.http.transport
    }

    /// Resolve a reference to its manifest descriptor with a `HEAD` request.
    pub async fn resolve(&self, reference: &ArtifactRef) -> ClientResult<Descriptor> {
        self.resolve_inner(reference, None).await
    }

    /// [`resolve`](Self::resolve), abandoned when `cancel` fires.
    pub async fn resolve_cancellable(
        &self,
        reference: &ArtifactRef,
        cancel: &CancellationToken,
    ) -> ClientResult<Descriptor> {
        self.resolve_inner(reference, Some(cancel)).await
    }

    async fn resolve_inner(
        &self,
        reference: &ArtifactRef,
        cancel: Option<&CancellationToken>,
    ) -> ClientResult<Descriptor> {
        let url = self.http.url(&reference.registry, &reference.manifest_path())?;
        debug!(url = %url, "resolving manifest");

        let response = self
            .http
            .manifest_request(Method::HEAD, url, cancel)
            .await?;
        let descriptor = ManifestHeaders::from_headers(response.headers()).into_descriptor()?;
        check_pinned(reference, &descriptor)?;
        Ok(descriptor)
    }

    /// Fetch manifest bytes and describe them from the content itself.
    ///
    /// A `Docker-Content-Digest` header, when present, must match the content
    /// under the header's algorithm. The descriptor uses the pinned digest's
    /// algorithm, else the header's, else sha256.
    pub async fn fetch_manifest(
        &self,
        reference: &ArtifactRef,
    ) -> ClientResult<(Descriptor, Vec<u8>)> {
        let url = self.http.url(&reference.registry, &reference.manifest_path())?;
        debug!(url = %url, "fetching manifest");

        let response = self.http.manifest_request(Method::GET, url, None).await?;
        let headers = ManifestHeaders::from_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::InvalidResponse {
                message: format!("failed to read manifest body: {}", e),
            })?
            .to_vec();

        let media_type = headers.media_type.ok_or_else(|| ClientError::InvalidResponse {
            message: "manifest response has no Content-Type".to_string(),
        })?;

        // Describe the content in the pinned algorithm, else the registry's.
        let algorithm = reference
            .digest()
            .or(headers.digest.as_deref())
            .map_or("sha256", algorithm_of);
        let descriptor = Descriptor::new(
            media_type,
            content_digest(algorithm, &body)?,
            body.len() as u64,
        );

        if let Some(claimed) = headers.digest.as_deref() {
            let actual = content_digest(algorithm_of(claimed), &body)?;
            if claimed != actual {
                return Err(ClientError::InvalidResponse {
                    message: format!(
                        "digest mismatch: header {} but content is {}",
                        claimed, actual
                    ),
                });
            }
        }
        check_pinned(reference, &descriptor)?;
        Ok((descriptor, body))
    }

    pub fn is_authenticated(&self) -> bool {
        !self.http.transport.credentials().is_anonymous()
    }
}

fn content_digest(algorithm: &str, body: &[u8]) -> ClientResult<String> {
    digest_with(algorithm, body).ok_or_else(|| ClientError::InvalidResponse {
        message: format!("unsupported digest algorithm {}", algorithm),
    })
}

fn check_pinned(reference: &ArtifactRef, descriptor: &Descriptor) -> ClientResult<()> {
    match reference.digest() {
        Some(pinned) if pinned != descriptor.digest => Err(ClientError::InvalidResponse {
            message: format!(
                "registry returned {} for pinned digest {}",
                descriptor.digest, pinned
            ),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent() {
        assert!(REGISTRY_USER_AGENT.starts_with("sigcheck/"));
    }

    #[test]
    fn test_anonymous_by_default() {
        let client = RegistryClient::new(ClientConfig::default()).unwrap();
        assert!(!client.is_authenticated());

        let client =
            RegistryClient::new(ClientConfig::default().with_credentials("alice", "pw")).unwrap();
        assert!(client.is_authenticated());
    }

    #[test]
    fn test_url_scheme_follows_plain_http() {
        let client = RegistryClient::new(ClientConfig::default()).unwrap();
        let url = client.http.url("registry.example", "/v2/").unwrap();
        assert_eq!(url.scheme(), "https");

        let client = RegistryClient::new(ClientConfig::default().with_plain_http(true)).unwrap();
        let url = client.http.url("localhost:5000", "/v2/app/manifests/v1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/v2/app/manifests/v1");
    }

    #[test]
    fn test_pinned_digest_mismatch() {
        let reference = ArtifactRef::parse(
            "registry.example/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
        .unwrap();
        let other = Descriptor::from_content("application/json", b"x");
        assert!(check_pinned(&reference, &other).is_err());

        let same = Descriptor::from_content("application/json", b"");
        assert!(check_pinned(&reference, &same).is_ok());
    }
}
