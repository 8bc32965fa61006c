//! # Tollgate Keys
//!
//! Types shared by the tollgate token issuer and verifier.
//!
//! This crate provides:
//! - **Key material**: the issuer's single signing keypair, generated at startup or loaded from PEM
//! - **Claims**: the `sub`/`iss`/`exp`/`ROLE` claim set and the closed set of [`Grant`]s
//! - **Public key sets**: the JWK set wire format, with lookup by key id
//!
//! ## Example
//!
//! ```no_run
//! use tollgate_keys::{Claims, Grant, KeyKind, KeyMaterial, unix_now};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let material = KeyMaterial::generate("auth-server-key-id", KeyKind::Rsa)?;
//! let claims = Claims::for_grant(Grant::User(42), "auth-server", unix_now(), 900);
//! let token = material.sign(&claims)?;
//!
//! let published = material.public_key_set();
//! assert!(published.find("auth-server-key-id").is_some());
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Claims, roles, and grants.
pub mod claims;
/// Key and config error types.
pub mod error;
/// JWK set wire format.
pub mod jwk;
/// Issuer signing key material.
pub mod material;

pub use claims::{Claims, Grant, PRIVILEGED_SUBJECT, Role, UnknownRole, UserId, unix_now};
pub use error::{BoxError, ConfigError, KeyError, KeyResult};
pub use jwk::{InvalidKid, Jwk, MAX_KID_LENGTH, OkpPublicJwk, PublicKeySet, RsaPublicJwk, validate_kid};
pub use material::{KeyKind, KeyMaterial, RSA_KEY_BITS};
