//! Key material and configuration error types.
//!
//! [`KeyError`] covers everything that can go wrong while generating, loading,
//! publishing, or decoding keys. [`ConfigError`] is returned by the validating
//! config builders in the issuer and verifier crates.
//!
//! # Example
//!
//! ```
//! use tollgate_keys::{KeyError, KeyResult};
//!
//! fn reject(kty: &str) -> KeyResult<()> {
//!     Err(KeyError::unsupported_key_kind(kty))
//! }
//!
//! assert!(matches!(reject("EC"), Err(KeyError::UnsupportedKeyKind { .. })));
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors raised while handling key material or its public wire form.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KeyError {
    /// A key-set entry carried a `kty` this crate cannot turn into a verifier.
    #[error("Unsupported key kind: {kty}")]
    UnsupportedKeyKind {
        /// The `kty` discriminator as it appeared on the wire.
        kty: String,
    },

    /// A published public key could not be decoded.
    #[error("Invalid public key: {message}")]
    InvalidPublicKey {
        /// Description of what was wrong with the key.
        message: String,
    },

    /// A private key could not be generated or loaded.
    #[error("Invalid private key: {message}")]
    InvalidPrivateKey {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// The key-set document itself was not valid JSON of the expected shape.
    #[error("Malformed key set: {message}")]
    MalformedKeySet {
        /// Description of the parse failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// The signing primitive failed.
    #[error("Signing failed: {message}")]
    Signing {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl KeyError {
    /// Creates an [`KeyError::UnsupportedKeyKind`] error.
    #[must_use]
    pub fn unsupported_key_kind(kty: impl Into<String>) -> Self {
        Self::UnsupportedKeyKind { kty: kty.into() }
    }

    /// Creates an [`KeyError::InvalidPublicKey`] error.
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey { message: message.into() }
    }

    /// Creates an [`KeyError::InvalidPrivateKey`] error.
    #[must_use]
    pub fn invalid_private_key(message: impl Into<String>) -> Self {
        Self::InvalidPrivateKey { message: message.into(), source: None }
    }

    /// Creates an [`KeyError::InvalidPrivateKey`] error with a source.
    #[must_use]
    pub fn invalid_private_key_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::InvalidPrivateKey { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a [`KeyError::MalformedKeySet`] error with a source.
    #[must_use]
    pub fn malformed_key_set_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::MalformedKeySet { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a [`KeyError::MalformedKeySet`] error.
    #[must_use]
    pub fn malformed_key_set(message: impl Into<String>) -> Self {
        Self::MalformedKeySet { message: message.into(), source: None }
    }

    /// Creates a [`KeyError::Signing`] error with a source.
    #[must_use]
    pub fn signing_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Signing { message: message.into(), source: Some(Arc::new(source)) }
    }
}

/// Errors returned by validating config builders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required string field was empty.
    #[error("{field} cannot be empty")]
    Empty {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A numeric or duration field was below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value, rendered for display.
        value: String,
        /// The minimum accepted value, rendered for display.
        min: String,
    },

    /// A field had a value that is well-typed but unusable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        let err = KeyError::unsupported_key_kind("EC");
        assert_eq!(err.to_string(), "Unsupported key kind: EC");

        let err = KeyError::invalid_public_key("bad modulus");
        assert_eq!(err.to_string(), "Invalid public key: bad modulus");

        let err = ConfigError::Empty { field: "issuer" };
        assert_eq!(err.to_string(), "issuer cannot be empty");

        let err = ConfigError::BelowMinimum {
            field: "token_ttl",
            value: "0ms".into(),
            min: "1s".into(),
        };
        assert_eq!(err.to_string(), "token_ttl must be at least 1s, got 0ms");
    }

    #[test]
    fn test_with_source_preserves_chain() {
        let io = std::io::Error::other("disk on fire");
        let err = KeyError::invalid_private_key_with_source("could not read key", io);

        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn test_plain_constructors_have_no_source() {
        assert!(KeyError::invalid_private_key("x").source().is_none());
        assert!(KeyError::malformed_key_set("x").source().is_none());
    }
}
