//! Key set retrieval.
//!
//! [`KeySetFetcher`] is the seam between the cache and the transport. The
//! production implementation, [`HttpKeySetFetcher`], performs a plain GET
//! against the issuer's key set endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tollgate_keys::PublicKeySet;

use crate::error::{AuthError, FetchError, Result};

/// Source of the issuer's public key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Retrieves the current key set.
    ///
    /// Implementations report transport and decoding failures; the cache
    /// applies timeouts and the empty-set check on top.
    async fn fetch(&self) -> std::result::Result<PublicKeySet, FetchError>;
}

/// Fetches the key set from an HTTP endpoint.
#[derive(Clone, Debug)]
pub struct HttpKeySetFetcher {
    client: Client,
    url: String,
}

impl HttpKeySetFetcher {
    /// Creates a fetcher for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(AuthError::HttpClient)?;
        Ok(Self::with_client(client, url))
    }

    /// Creates a fetcher that reuses an existing client.
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    /// The endpoint this fetcher reads from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> std::result::Result<PublicKeySet, FetchError> {
        let response = self.client.get(&self.url).send().await.map_err(FetchError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(FetchError::Http)?;
        PublicKeySet::from_json(&body).map_err(FetchError::Decode)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;
    use tollgate_keys::{KeyError, KeyKind, KeyMaterial};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    async fn server_responding(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/auth/jwks")).respond_with(template).mount(&server).await;
        server
    }

    fn fetcher(server: &MockServer) -> HttpKeySetFetcher {
        HttpKeySetFetcher::new(format!("{}/auth/jwks", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_published_set() {
        let material = KeyMaterial::generate("kid-1", KeyKind::Ed25519).unwrap();
        let server =
            server_responding(ResponseTemplate::new(200).set_body_json(material.public_key_set()))
                .await;

        let set = fetcher(&server).fetch().await.unwrap();
        assert_eq!(set, material.public_key_set());
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = server_responding(ResponseTemplate::new(503)).await;
        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_unsupported_key_kind_surfaces() {
        let body = json!({"keys": [{"kty": "EC", "kid": "ec-1", "crv": "P-256"}]});
        let server = server_responding(ResponseTemplate::new(200).set_body_json(body)).await;

        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(KeyError::UnsupportedKeyKind { .. })));
    }

    #[tokio::test]
    async fn test_garbage_body() {
        let server =
            server_responding(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;
        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(KeyError::MalformedKeySet { .. })));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let server = MockServer::start().await;
        let url = format!("{}/auth/jwks", server.uri());
        drop(server);

        let err = HttpKeySetFetcher::new(url, Duration::from_secs(1)).unwrap().fetch().await;
        assert!(matches!(err, Err(FetchError::Http(_))));
    }
}
