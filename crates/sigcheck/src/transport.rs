//! Request-sending capabilities and the bearer-token authenticating layer.
//!
//! A [`Transport`] sends one request and returns the response. A
//! [`TransportLayer`] wraps a transport into an augmented one;
//! [`BearerAuthLayer`] produces an [`AuthTransport`] that answers a
//! registry's `401` + `Www-Authenticate: Bearer ...` challenge by fetching a
//! token from the realm and retrying the original request exactly once.
//!
//! The transport holds no per-call state. Each send works on clones of the
//! caller's request, so one instance can be shared across tasks.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{parse_challenge, Challenge, Credentials, TokenResponse};
use crate::error::{TransportError, TransportResult};

/// Something that can send an HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> TransportResult<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> TransportResult<Response> {
        Ok(self.execute(request).await?)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> TransportResult<Response> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: Request) -> TransportResult<Response> {
        (**self).send(request).await
    }
}

/// Wraps a transport into an augmented transport.
pub trait TransportLayer<T: Transport> {
    type Output: Transport;

    fn layer(&self, inner: T) -> Self::Output;
}

/// Layer that adds registry bearer-token authentication.
#[derive(Debug, Clone, Default)]
pub struct BearerAuthLayer {
    credentials: Credentials,
}

impl BearerAuthLayer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl<T: Transport> TransportLayer<T> for BearerAuthLayer {
    type Output = AuthTransport<T>;

    fn layer(&self, inner: T) -> Self::Output {
        AuthTransport::new(inner, self.credentials.clone())
    }
}

/// Outcome of a token fetch that reached the token endpoint.
enum TokenOutcome {
    Issued(String),
    Rejected(StatusCode),
}

/// Transport that performs the bearer-token challenge/response protocol.
#[derive(Debug, Clone)]
pub struct AuthTransport<T> {
    inner: T,
    credentials: Credentials,
}

impl<T: Transport> AuthTransport<T> {
    pub fn new(inner: T, credentials: Credentials) -> Self {
        Self { inner, credentials }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn clone_request(request: &Request) -> TransportResult<Request> {
        request
            .try_clone()
            .ok_or_else(|| TransportError::UnclonableRequest {
                url: request.url().to_string(),
            })
    }

    fn attach_basic_auth(&self, request: &mut Request) -> TransportResult<()> {
        if let Some(value) = self.credentials.basic_auth_header()? {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(())
    }

    fn token_url(challenge: &Challenge) -> TransportResult<Url> {
        let realm = challenge.realm().unwrap_or_default();
        if realm.is_empty() {
            return Err(TransportError::InvalidRealm {
                realm: String::new(),
                reason: "challenge has no realm".to_string(),
            });
        }

        let mut url = Url::parse(realm).map_err(|e| TransportError::InvalidRealm {
            realm: realm.to_string(),
            reason: e.to_string(),
        })?;

        if challenge.service().is_some() || challenge.scope().is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(service) = challenge.service() {
                query.append_pair("service", service);
            }
            if let Some(scope) = challenge.scope() {
                query.append_pair("scope", scope);
            }
        }

        Ok(url)
    }

    async fn fetch_token(&self, challenge: &Challenge) -> TransportResult<TokenOutcome> {
        let url = Self::token_url(challenge)?;
        debug!(realm = %url, "fetching bearer token");

        let mut request = Request::new(Method::GET, url);
        self.attach_basic_auth(&mut request)?;

        let response = self.inner.send(request).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Ok(TokenOutcome::Rejected(status));
        }

        let body = response.bytes().await?;
        let token = TokenResponse::decode(&body)?;
        Ok(TokenOutcome::Issued(token.access_token))
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthTransport<T> {
    async fn send(&self, request: Request) -> TransportResult<Response> {
        let mut attempt = Self::clone_request(&request)?;
        self.attach_basic_auth(&mut attempt)?;

        let response = self.inner.send(attempt).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = parse_challenge(
            response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default(),
        );
        if !challenge.is_bearer() {
            debug!(scheme = %challenge.scheme, "unsupported auth challenge, passing 401 through");
            return Ok(response);
        }

        let token = match self.fetch_token(&challenge).await? {
            TokenOutcome::Issued(token) => token,
            TokenOutcome::Rejected(status) => {
                warn!(
                    status = status.as_u16(),
                    url = %request.url(),
                    "token endpoint refused, returning original 401"
                );
                return Ok(response);
            }
        };
        drop(response);

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            TransportError::InvalidHeader {
                message: e.to_string(),
            }
        })?;
        value.set_sensitive(true);

        let mut retry = Self::clone_request(&request)?;
        retry.headers_mut().insert(AUTHORIZATION, value);
        debug!(url = %retry.url(), "retrying with bearer token");
        self.inner.send(retry).await
    }
}

/// Send through `transport`, giving up when `cancel` fires.
pub async fn send_cancellable<T: Transport + ?Sized>(
    transport: &T,
    request: Request,
    cancel: &CancellationToken,
) -> TransportResult<Response> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = transport.send(request) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(header: &str) -> Challenge {
        parse_challenge(header)
    }

    #[test]
    fn test_token_url_with_service_and_scope() {
        let url = AuthTransport::<reqwest::Client>::token_url(&challenge(
            r#"Bearer realm="https://auth.example/token",service="registry",scope="repo:foo:pull""#,
        ))
        .unwrap();
        assert_eq!(url.host_str(), Some("auth.example"));
        assert_eq!(url.path(), "/token");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("service".to_string(), "registry".to_string()),
                ("scope".to_string(), "repo:foo:pull".to_string()),
            ]
        );
    }

    #[test]
    fn test_token_url_omits_absent_params() {
        let url = AuthTransport::<reqwest::Client>::token_url(&challenge(
            r#"Bearer realm="https://auth.example/token""#,
        ))
        .unwrap();
        assert_eq!(url.as_str(), "https://auth.example/token");

        let url = AuthTransport::<reqwest::Client>::token_url(&challenge(
            r#"Bearer realm="https://auth.example/token",scope="repo:foo:pull""#,
        ))
        .unwrap();
        assert_eq!(url.query(), Some("scope=repo%3Afoo%3Apull"));
    }

    #[test]
    fn test_token_url_requires_realm() {
        let err = AuthTransport::<reqwest::Client>::token_url(&challenge(
            r#"Bearer service="registry""#,
        ))
        .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRealm { .. }));

        let err = AuthTransport::<reqwest::Client>::token_url(&challenge(
            r#"Bearer realm="not a url""#,
        ))
        .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRealm { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let transport = BearerAuthLayer::default().layer(reqwest::Client::new());
        let request = Request::new(Method::GET, Url::parse("http://127.0.0.1:9/v2/").unwrap());
        let result = send_cancellable(&transport, request, &cancel).await;
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }
}
