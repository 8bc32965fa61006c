//! Token verification.
//!
//! [`TokenVerifier::verify`] evaluates a presented `Authorization` value in a
//! fixed order and stops at the first failing step:
//!
//! 1. the value starts with `Bearer `
//! 2. the remainder is a structurally valid compact token
//! 3. the signature verifies against the published key named by `kid`
//! 4. `exp` is strictly in the future
//! 5. the `ROLE` claim equals the required role
//! 6. for `USER` operations, `sub` equals the subject addressed by the request
//!
//! Each failing step produces a distinct [`DenyReason`] for logs. Callers
//! should collapse all of them into one external rejection.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_authn::{KeySetCache, TokenVerifier, Verdict, VerifierConfig};
//! use tollgate_keys::Role;
//!
//! # async fn example(header: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig::builder().jwks_url("http://auth-server/auth/jwks").build()?;
//! let verifier = TokenVerifier::new(Arc::new(KeySetCache::from_config(&config)?));
//!
//! match verifier.verify(header, Role::User, Some("42")).await? {
//!     Verdict::Allow(claims) => println!("allowed {}", claims.sub),
//!     Verdict::Deny(reason) => println!("denied: {reason}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::{fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};
use tollgate_keys::{Claims, Role, unix_now};

use crate::{
    config::VerifierConfig,
    error::{AuthError, Result},
    key_set_cache::KeySetCache,
    validation::{HeaderError, validate_algorithm, validate_kid},
};

/// Required prefix of the `Authorization` header value.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Why a token was refused. Internal detail for logs; never sent to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DenyReason {
    /// The header value did not start with the bearer prefix.
    MalformedHeader,
    /// The token could not be parsed.
    MalformedToken,
    /// No trusted key verified the signature.
    InvalidSignature,
    /// The token's `exp` is not in the future.
    Expired,
    /// The token's role differs from the required one.
    RoleMismatch,
    /// The token's subject differs from the addressed resource owner.
    SubjectMismatch,
}

impl DenyReason {
    /// Stable snake_case label for structured logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedHeader => "malformed_header",
            Self::MalformedToken => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::RoleMismatch => "role_mismatch",
            Self::SubjectMismatch => "subject_mismatch",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`TokenVerifier::verify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Access granted; carries the verified claims.
    Allow(Claims),
    /// Access refused.
    Deny(DenyReason),
}

impl Verdict {
    /// Returns `true` for [`Verdict::Allow`].
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// The deny reason, if access was refused.
    #[must_use]
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow(_) => None,
            Self::Deny(reason) => Some(*reason),
        }
    }

    /// The verified claims, if access was granted.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Allow(claims) => Some(claims),
            Self::Deny(_) => None,
        }
    }
}

enum Rejection {
    Deny(DenyReason),
    Unavailable(AuthError),
}

impl From<DenyReason> for Rejection {
    fn from(reason: DenyReason) -> Self {
        Self::Deny(reason)
    }
}

impl From<AuthError> for Rejection {
    fn from(err: AuthError) -> Self {
        Self::Unavailable(err)
    }
}

/// Validates presented tokens against the issuer's published keys.
#[derive(Clone, Debug)]
pub struct TokenVerifier {
    key_sets: Arc<KeySetCache>,
}

impl TokenVerifier {
    /// Creates a verifier reading keys from `key_sets`.
    #[must_use]
    pub fn new(key_sets: Arc<KeySetCache>) -> Self {
        Self { key_sets }
    }

    /// Creates a verifier with an HTTP-backed key set cache.
    ///
    /// # Errors
    ///
    /// See [`KeySetCache::from_config`].
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(KeySetCache::from_config(config)?)))
    }

    /// The key set cache backing this verifier.
    #[must_use]
    pub fn key_sets(&self) -> &Arc<KeySetCache> {
        &self.key_sets
    }

    /// Verifies an `Authorization` header value for an operation requiring
    /// `required_role`.
    ///
    /// `subject_from_request` is the resource owner addressed by the request.
    /// It is only consulted when `required_role` is [`Role::User`]; an absent
    /// or empty subject then denies.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeySetUnavailable`] if the key set is needed and
    /// cannot be obtained. Every token problem is a [`Verdict::Deny`] instead.
    #[tracing::instrument(skip(self, authorization), fields(required_role = %required_role))]
    pub async fn verify(
        &self,
        authorization: &str,
        required_role: Role,
        subject_from_request: Option<&str>,
    ) -> Result<Verdict> {
        match self.evaluate(authorization, required_role, subject_from_request).await {
            Ok(claims) => {
                tracing::debug!(subject = %claims.sub, "token accepted");
                Ok(Verdict::Allow(claims))
            },
            Err(Rejection::Deny(reason)) => {
                tracing::warn!(reason = reason.as_str(), "token denied");
                Ok(Verdict::Deny(reason))
            },
            Err(Rejection::Unavailable(err)) => Err(err),
        }
    }

    async fn evaluate(
        &self,
        authorization: &str,
        required_role: Role,
        subject_from_request: Option<&str>,
    ) -> std::result::Result<Claims, Rejection> {
        let token = authorization.strip_prefix(BEARER_PREFIX).ok_or(DenyReason::MalformedHeader)?;
        let header = parse_token(token)?;
        let claims = self.check_signature(token, &header).await?;

        check_expiry(&claims, unix_now())?;
        check_role(&claims, required_role)?;
        if required_role == Role::User {
            check_subject(&claims, subject_from_request)?;
        }

        Ok(claims)
    }

    async fn check_signature(
        &self,
        token: &str,
        header: &Header,
    ) -> std::result::Result<Claims, Rejection> {
        let kid = check_header(header).map_err(|e| {
            tracing::debug!(error = %e, "token header rejected");
            DenyReason::InvalidSignature
        })?;

        let key_set = self.key_sets.get().await?;

        let Some(jwk) = key_set.find(kid) else {
            tracing::warn!(kid, "no published key matches token kid");
            return Err(DenyReason::InvalidSignature.into());
        };
        if jwk.algorithm() != header.alg {
            tracing::debug!(kid, alg = ?header.alg, "token algorithm does not match key kind");
            return Err(DenyReason::InvalidSignature.into());
        }

        let key = jwk.decoding_key().map_err(|e| {
            tracing::warn!(kid, error = %e, "published key is unusable");
            DenyReason::InvalidSignature
        })?;

        verify_signature(token, &key, jwk.algorithm()).map_err(|e| {
            tracing::debug!(kid, error = %e, "signature verification failed");
            DenyReason::InvalidSignature.into()
        })
    }
}

/// Checks that `token` is a three-segment compact token with a decodable
/// header and claim set.
///
/// # Errors
///
/// Returns [`DenyReason::MalformedToken`] on any structural problem.
pub fn parse_token(token: &str) -> std::result::Result<Header, DenyReason> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(DenyReason::MalformedToken);
    }

    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "token header undecodable");
        DenyReason::MalformedToken
    })?;

    let payload = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|_| DenyReason::MalformedToken)?;
    serde_json::from_slice::<Claims>(&payload).map_err(|e| {
        tracing::debug!(error = %e, "token claims undecodable");
        DenyReason::MalformedToken
    })?;

    Ok(header)
}

fn check_header(header: &Header) -> std::result::Result<&str, HeaderError> {
    validate_algorithm(&format!("{:?}", header.alg))?;
    let kid = header.kid.as_deref().ok_or(HeaderError::MissingKid)?;
    validate_kid(kid)?;
    Ok(kid)
}

/// Verifies the signature of `token` and returns its claims.
///
/// Expiry is deliberately not checked here; see [`TokenVerifier::verify`].
///
/// # Errors
///
/// Returns the backend error if the signature does not verify or the claims
/// cannot be decoded.
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> jsonwebtoken::errors::Result<Claims> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    decode::<Claims>(token, key, &validation).map(|data| data.claims)
}

fn check_expiry(claims: &Claims, now: u64) -> std::result::Result<(), DenyReason> {
    if claims.is_live_at(now) { Ok(()) } else { Err(DenyReason::Expired) }
}

fn check_role(claims: &Claims, required_role: Role) -> std::result::Result<(), DenyReason> {
    if claims.role == required_role { Ok(()) } else { Err(DenyReason::RoleMismatch) }
}

fn check_subject(claims: &Claims, subject: Option<&str>) -> std::result::Result<(), DenyReason> {
    match subject {
        Some(subject) if !subject.trim().is_empty() && subject == claims.sub => Ok(()),
        _ => Err(DenyReason::SubjectMismatch),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::testutil::craft_raw_jwt;

    fn claims(sub: &str, role: Role, exp: u64) -> Claims {
        Claims { sub: sub.into(), iss: "auth-server".into(), iat: 0, exp, role }
    }

    #[rstest]
    #[case::one_part("abc")]
    #[case::two_parts("abc.def")]
    #[case::four_parts("a.b.c.d")]
    #[case::empty_header(".e30.sig")]
    #[case::not_base64("!!!.???.sig")]
    fn test_parse_rejects_structure(#[case] token: &str) {
        assert_eq!(parse_token(token), Err(DenyReason::MalformedToken));
    }

    #[test]
    fn test_parse_rejects_claims_without_role() {
        let token = craft_raw_jwt(
            &json!({"alg": "RS256", "typ": "JWT", "kid": "k"}),
            &json!({"sub": "1", "iss": "x", "exp": 10}),
        );
        assert_eq!(parse_token(&token), Err(DenyReason::MalformedToken));
    }

    #[test]
    fn test_parse_rejects_alg_none() {
        let token = craft_raw_jwt(
            &json!({"alg": "none", "typ": "JWT"}),
            &json!({"sub": "1", "iss": "x", "exp": 10, "ROLE": "USER"}),
        );
        assert_eq!(parse_token(&token), Err(DenyReason::MalformedToken));
    }

    #[test]
    fn test_parse_accepts_well_formed() {
        let token = craft_raw_jwt(
            &json!({"alg": "RS256", "typ": "JWT", "kid": "k"}),
            &json!({"sub": "1", "iss": "x", "exp": 10, "ROLE": "USER"}),
        );
        let header = parse_token(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("k"));
    }

    #[test]
    fn test_check_header() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k".into());
        assert!(matches!(check_header(&header), Err(HeaderError::ForbiddenAlgorithm(_))));

        let header = Header::new(Algorithm::RS256);
        assert_eq!(check_header(&header), Err(HeaderError::MissingKid));

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some("good-kid".into());
        assert_eq!(check_header(&header), Ok("good-kid"));
    }

    #[rstest]
    #[case::future(101, 100, Ok(()))]
    #[case::now(100, 100, Err(DenyReason::Expired))]
    #[case::past(99, 100, Err(DenyReason::Expired))]
    fn test_check_expiry(
        #[case] exp: u64,
        #[case] now: u64,
        #[case] expected: std::result::Result<(), DenyReason>,
    ) {
        assert_eq!(check_expiry(&claims("1", Role::User, exp), now), expected);
    }

    #[rstest]
    #[case(Role::User, Role::User, true)]
    #[case(Role::Privileged, Role::Privileged, true)]
    #[case(Role::User, Role::Privileged, false)]
    #[case(Role::Privileged, Role::User, false)]
    fn test_role_is_exact_equality(#[case] held: Role, #[case] required: Role, #[case] ok: bool) {
        assert_eq!(check_role(&claims("1", held, 10), required).is_ok(), ok);
    }

    #[rstest]
    #[case::matches(Some("42"), true)]
    #[case::differs(Some("43"), false)]
    #[case::empty(Some(""), false)]
    #[case::blank(Some("  "), false)]
    #[case::absent(None, false)]
    fn test_check_subject(#[case] subject: Option<&str>, #[case] ok: bool) {
        assert_eq!(check_subject(&claims("42", Role::User, 10), subject).is_ok(), ok);
    }

    #[test]
    fn test_verdict_accessors() {
        let allow = Verdict::Allow(claims("1", Role::User, 10));
        assert!(allow.is_allow());
        assert_eq!(allow.claims().unwrap().sub, "1");
        assert_eq!(allow.deny_reason(), None);

        let deny = Verdict::Deny(DenyReason::Expired);
        assert!(!deny.is_allow());
        assert_eq!(deny.deny_reason(), Some(DenyReason::Expired));
        assert_eq!(deny.deny_reason().unwrap().to_string(), "expired");
    }

    proptest! {
        #[test]
        fn parse_token_never_panics(token in ".*") {
            let _ = parse_token(&token);
        }

        #[test]
        fn subject_match_requires_equality(sub in "[0-9]{1,12}", other in "[0-9]{1,12}") {
            let result = check_subject(&claims(&sub, Role::User, 10), Some(&other));
            prop_assert_eq!(result.is_ok(), sub == other);
        }
    }
}
