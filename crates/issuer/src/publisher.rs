//! Public key set publication.
//!
//! The publisher serves the issuer's verification key over an unauthenticated
//! GET route so verifiers can fetch it out of band:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_issuer::{IssuerConfig, TokenIssuer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let issuer = Arc::new(TokenIssuer::from_config(&IssuerConfig::default())?);
//! let app = issuer.publisher().router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use tollgate_keys::{KeyMaterial, PublicKeySet};

/// Default route of the key set endpoint.
pub const DEFAULT_KEY_SET_PATH: &str = "/auth/jwks";

/// Exposes the public half of the issuer's key material.
///
/// The key set is computed once at construction; the active key never
/// changes for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct PublicKeySetPublisher {
    key_set: Arc<PublicKeySet>,
}

impl PublicKeySetPublisher {
    /// Creates a publisher for `material`'s public key.
    #[must_use]
    pub fn new(material: &KeyMaterial) -> Self {
        Self { key_set: Arc::new(material.public_key_set()) }
    }

    /// The currently published key set.
    #[must_use]
    pub fn current_key_set(&self) -> PublicKeySet {
        PublicKeySet::clone(&self.key_set)
    }

    /// A router serving the key set at [`DEFAULT_KEY_SET_PATH`].
    #[must_use]
    pub fn router(&self) -> Router {
        self.router_at(DEFAULT_KEY_SET_PATH)
    }

    /// A router serving the key set at `path`.
    #[must_use]
    pub fn router_at(&self, path: &str) -> Router {
        Router::new().route(path, get(serve_key_set)).with_state(self.clone())
    }
}

async fn serve_key_set(State(publisher): State<PublicKeySetPublisher>) -> Json<PublicKeySet> {
    tracing::debug!(keys = publisher.key_set.len(), "serving public key set");
    Json(publisher.current_key_set())
}
