//! Issuer error types.

use thiserror::Error;
use tollgate_keys::{ConfigError, KeyError};

/// Errors raised by the token issuer.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IssuerError {
    /// The signing primitive failed. Fatal for the request; not retried.
    #[error("Token signing failed")]
    Signing(#[source] KeyError),

    /// Key material could not be generated or loaded.
    #[error("Key material unavailable")]
    KeyMaterial(#[source] KeyError),

    /// The private key file could not be read.
    #[error("Failed to read private key from {path}")]
    KeyFile {
        /// Path that was being read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected by validation.
    #[error("Invalid issuer configuration: {0}")]
    Config(#[from] ConfigError),

    /// The outbound HTTP client could not be built.
    #[error("Outbound client error")]
    Outbound(#[source] reqwest::Error),
}

/// Result type alias for issuer operations.
pub type Result<T> = std::result::Result<T, IssuerError>;
