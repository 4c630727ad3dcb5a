//! HTTP layer: request building, status mapping and manifest headers.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::transport::{send_cancellable, AuthTransport, Transport};
use crate::types::Descriptor;

/// Manifest media types offered in `Accept`.
const ACCEPT_MANIFESTS: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// HTTP backend (holds the authenticating transport and the URL scheme).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) transport: AuthTransport<reqwest::Client>,
    pub(crate) plain_http: bool,
}

impl HttpBackend {
    pub(crate) fn url(&self, registry: &str, path: &str) -> ClientResult<Url> {
        let scheme = if self.plain_http { "http" } else { "https" };
        let raw = format!("{}://{}{}", scheme, registry, path);
        Url::parse(&raw).map_err(|e| ClientError::Config {
            message: format!("invalid registry URL {}: {}", raw, e),
        })
    }

    /// Send a manifest request; non-2xx becomes [`ClientError::Status`].
    pub(crate) async fn manifest_request(
        &self,
        method: Method,
        url: Url,
        cancel: Option<&CancellationToken>,
    ) -> ClientResult<Response> {
        let mut request = Request::new(method, url);
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static(ACCEPT_MANIFESTS));

        let response = match cancel {
            Some(cancel) => send_cancellable(&self.transport, request, cancel).await?,
            None => self.transport.send(request).await?,
        };

        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "registry response");
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }
}

/// Descriptor fields as reported by response headers.
#[derive(Debug, Default)]
pub(crate) struct ManifestHeaders {
    pub(crate) digest: Option<String>,
    pub(crate) media_type: Option<String>,
    pub(crate) size: Option<u64>,
}

impl ManifestHeaders {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        };
        Self {
            digest: text(DOCKER_CONTENT_DIGEST),
            media_type: text(CONTENT_TYPE.as_str()).map(|ct| {
                ct.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            }),
            size: text(CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok()),
        }
    }

    /// Full descriptor; every field must be present.
    pub(crate) fn into_descriptor(self) -> ClientResult<Descriptor> {
        let missing = |what: &str| ClientError::InvalidResponse {
            message: format!("manifest response has no {}", what),
        };
        Ok(Descriptor::new(
            self.media_type.ok_or_else(|| missing("Content-Type"))?,
            self.digest.ok_or_else(|| missing("Docker-Content-Digest"))?,
            self.size.ok_or_else(|| missing("Content-Length"))?,
        ))
    }
}
