//! Token header checks.
//!
//! These run before any key lookup, so a hostile header never triggers a
//! key set fetch.
//!
//! # Security
//!
//! - Only asymmetric algorithms (RS256, EdDSA) are accepted
//! - `none` and the HMAC family are always rejected, which blocks algorithm
//!   substitution against a published public key
//! - Key ids are restricted to a short, printable alphabet

use thiserror::Error;

pub use tollgate_keys::MAX_KID_LENGTH;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric; a verifier holding only a public
///   key could be tricked into using it as an HMAC secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Algorithms the verifier can check end to end.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["RS256", "EdDSA"];

/// Why a token header was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HeaderError {
    /// The algorithm is on the forbidden list.
    #[error("Algorithm '{0}' is not allowed for security reasons")]
    ForbiddenAlgorithm(String),

    /// The algorithm is not one the verifier supports.
    #[error("Algorithm '{0}' is not in accepted list")]
    UnsupportedAlgorithm(String),

    /// The `kid` header is absent.
    #[error("Token header missing 'kid'")]
    MissingKid,

    /// The `kid` header has an unacceptable shape.
    #[error("Invalid kid: {0}")]
    InvalidKid(String),
}

/// Validates the `alg` header against [`FORBIDDEN_ALGORITHMS`] and [`ACCEPTED_ALGORITHMS`].
///
/// # Errors
///
/// Returns [`HeaderError::ForbiddenAlgorithm`] or [`HeaderError::UnsupportedAlgorithm`].
///
/// # Examples
///
/// ```
/// use tollgate_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("none").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), HeaderError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(HeaderError::ForbiddenAlgorithm(alg.to_owned()));
    }
    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(HeaderError::UnsupportedAlgorithm(alg.to_owned()));
    }
    Ok(())
}

/// Validates the shape of a `kid` header.
///
/// Accepts 1 to [`MAX_KID_LENGTH`] characters from `[A-Za-z0-9._:-]`.
///
/// # Errors
///
/// Returns [`HeaderError::InvalidKid`] for empty, overlong, or out-of-alphabet ids.
pub fn validate_kid(kid: &str) -> Result<(), HeaderError> {
    tollgate_keys::validate_kid(kid).map_err(|e| HeaderError::InvalidKid(e.to_string()))
}
