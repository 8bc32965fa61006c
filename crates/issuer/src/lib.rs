//! # Tollgate Issuer
//!
//! Signs short-lived, role-scoped access tokens and publishes the public key
//! that verifiers need to check them.
//!
//! This crate provides:
//! - **Token issuance**: [`TokenIssuer`] signs `USER` tokens for authenticated users and
//!   `PRIVILEGED` tokens for internal calls
//! - **Key publication**: [`PublicKeySetPublisher`] serves the JWK set over HTTP
//! - **Outbound calls**: [`PrivilegedClient`] attaches a privileged bearer token to requests
//!
//! Credential checks happen before issuance and are not part of this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Issuer configuration.
pub mod config;
/// Issuer error types.
pub mod error;
/// Token issuance.
pub mod issuer;
/// Privileged outbound HTTP client.
pub mod outbound;
/// Public key set publication.
pub mod publisher;

pub use config::{DEFAULT_ISSUER, DEFAULT_KEY_ID, DEFAULT_TOKEN_TTL, IssuerConfig};
pub use error::{IssuerError, Result};
pub use issuer::{SignedToken, TokenIssuer};
pub use outbound::{DEFAULT_OUTBOUND_TIMEOUT, PrivilegedClient};
pub use publisher::{DEFAULT_KEY_SET_PATH, PublicKeySetPublisher};
