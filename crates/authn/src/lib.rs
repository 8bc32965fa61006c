//! # Tollgate Authentication
//!
//! Verifier side of tollgate: decides whether a presented bearer token
//! authorizes an operation.
//!
//! This crate provides:
//! - **Token verification**: signature, expiry, role, and subject checks in a
//!   fixed order, with a distinct deny reason per step
//! - **Key set cache**: TTL-bounded cache of the issuer's published key set
//! - **Authorization guard**: per-operation role enforcement, including axum
//!   middleware
//! - **Header validation**: rejection of `none` and symmetric algorithms
//!
//! ## Features
//!
//! - Only asymmetric algorithms (RS256, EdDSA) are supported
//! - An unavailable key set is an error, never a verdict
//! - Every deny looks the same from outside
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_authn::{AuthorizationGuard, KeySetCache, TokenVerifier, VerifierConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig::builder().jwks_url("http://auth-server:8080/auth/jwks").build()?;
//! let cache = Arc::new(KeySetCache::from_config(&config)?);
//! let guard = AuthorizationGuard::new(Arc::new(TokenVerifier::new(cache)));
//! # let _ = guard;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Verifier configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Key set retrieval.
pub mod fetcher;
/// Per-operation authorization.
pub mod guard;
/// TTL cache of the published key set.
pub mod key_set_cache;
/// Token header validation.
pub mod validation;
/// Token verification.
pub mod verifier;

/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::VerifierConfig;
pub use error::{AuthError, FetchError, Result};
pub use fetcher::{HttpKeySetFetcher, KeySetFetcher};
pub use guard::{AuthorizationGuard, GuardFuture, GuardRejection, require_role, subject_from_path};
pub use key_set_cache::{DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_SET_TTL, KeySetCache, StalePolicy};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::{BEARER_PREFIX, DenyReason, TokenVerifier, Verdict};
