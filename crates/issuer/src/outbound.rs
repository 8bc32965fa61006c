//! Outbound service-to-service calls.
//!
//! [`PrivilegedClient`] mints a fresh privileged token for every request it
//! builds and attaches it as `Authorization: Bearer <token>`, so downstream
//! services can authorize the issuer's own calls (for example creating a
//! profile during registration).

use std::{sync::Arc, time::Duration};

use reqwest::{Client, Method, RequestBuilder, header::AUTHORIZATION};

use crate::{
    error::{IssuerError, Result},
    issuer::TokenIssuer,
};

/// Default request timeout for outbound calls.
pub const DEFAULT_OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client whose requests carry a privileged bearer token.
#[derive(Clone, Debug)]
pub struct PrivilegedClient {
    http: Client,
    issuer: Arc<TokenIssuer>,
    base_url: String,
}

#[bon::bon]
impl PrivilegedClient {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::Outbound`] if the HTTP client cannot be built.
    #[builder]
    pub fn new(
        issuer: Arc<TokenIssuer>,
        #[builder(into)] base_url: String,
        #[builder(default = DEFAULT_OUTBOUND_TIMEOUT)] timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(IssuerError::Outbound)?;
        Ok(Self { http, issuer, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// Builds a request to `path` with a freshly minted privileged token.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::Signing`] if the token cannot be signed.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.issuer.issue_privileged_token()?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(%method, %url, "attaching privileged bearer token");

        Ok(self.http.request(method, url).header(AUTHORIZATION, token.bearer()))
    }

    /// Shorthand for a privileged `GET`.
    ///
    /// # Errors
    ///
    /// See [`PrivilegedClient::request`].
    pub fn get(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, path)
    }

    /// Shorthand for a privileged `POST`.
    ///
    /// # Errors
    ///
    /// See [`PrivilegedClient::request`].
    pub fn post(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::POST, path)
    }
}
