//! Verifier error types.
//!
//! Token rejections are not errors: they are reported as
//! [`Verdict::Deny`](crate::Verdict::Deny) values. The errors here are the
//! server-side failures that keep a verdict from being reached at all.

use std::time::Duration;

use thiserror::Error;
use tollgate_keys::{ConfigError, KeyError};

/// Errors that prevent the verifier from reaching a verdict.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The issuer's key set could not be obtained and no usable cached copy exists.
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(
        /// Why the fetch failed.
        #[source]
        FetchError,
    ),

    /// Configuration rejected by validation.
    #[error("Invalid verifier configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client for key set fetches could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl AuthError {
    /// Wraps a fetch failure as [`AuthError::KeySetUnavailable`].
    #[must_use]
    pub fn key_set_unavailable(source: FetchError) -> Self {
        Self::KeySetUnavailable(source)
    }
}

/// Reasons a key set fetch can fail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The document was not an acceptable key set.
    #[error("key set rejected: {0}")]
    Decode(#[source] KeyError),

    /// The endpoint returned a key set with no keys.
    #[error("key set is empty")]
    EmptyKeySet,

    /// The fetch did not complete within the configured timeout.
    #[error("fetch timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Any other failure reported by a custom fetcher.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl FetchError {
    /// Creates a [`FetchError::Other`] error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other { message: message.into() }
    }
}

/// Result type alias for verifier operations.
pub type Result<T> = std::result::Result<T, AuthError>;
