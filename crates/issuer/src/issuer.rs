//! Token issuance.

use std::{fmt, sync::Arc, time::Duration};

use tollgate_keys::{Claims, Grant, KeyMaterial, UserId, unix_now};

use crate::{
    config::{DEFAULT_ISSUER, DEFAULT_TOKEN_TTL, IssuerConfig},
    error::{IssuerError, Result},
    publisher::PublicKeySetPublisher,
};

/// A signed compact token together with the claims it carries.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    compact: String,
    claims: Claims,
}

impl SignedToken {
    /// The compact `header.payload.signature` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.compact
    }

    /// The claims that were signed.
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The value of an `Authorization` header carrying this token.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.compact)
    }

    /// Consumes the token, returning the compact form.
    #[must_use]
    pub fn into_string(self) -> String {
        self.compact
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("compact", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Signs claim sets for authenticated principals.
///
/// Immutable after construction; share it behind an [`Arc`].
pub struct TokenIssuer {
    material: Arc<KeyMaterial>,
    issuer: String,
    ttl: Duration,
}

#[bon::bon]
impl TokenIssuer {
    /// Creates an issuer signing with `material`.
    ///
    /// # Optional Fields
    ///
    /// * `issuer` - `iss` claim (default: `auth-server`).
    /// * `ttl` - Token lifetime (default: 15 minutes).
    #[builder]
    pub fn new(
        material: Arc<KeyMaterial>,
        #[builder(into, default = DEFAULT_ISSUER.to_owned())] issuer: String,
        #[builder(default = DEFAULT_TOKEN_TTL)] ttl: Duration,
    ) -> Self {
        Self { material, issuer, ttl }
    }

    /// Builds an issuer from configuration, loading or generating its key.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::Config`] if the config is invalid, or the key
    /// loading errors of [`IssuerConfig::key_material`].
    pub fn from_config(config: &IssuerConfig) -> Result<Self> {
        config.validate()?;
        let material = Arc::new(config.key_material()?);
        tracing::info!(
            kid = material.kid(),
            kind = ?material.kind(),
            loaded = config.private_key_path().is_some(),
            "issuer signing key ready"
        );
        Ok(Self { material, issuer: config.issuer().to_owned(), ttl: config.token_ttl() })
    }

    /// Signs a token for `grant`, valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::Signing`] if the signing primitive fails.
    #[tracing::instrument(skip(self), fields(kid = self.material.kid()))]
    pub fn issue(&self, grant: Grant) -> Result<SignedToken> {
        let claims = Claims::for_grant(grant, &self.issuer, unix_now(), self.ttl.as_secs());

        let compact = self.material.sign(&claims).map_err(|e| {
            tracing::error!(error = %e, "token signing failed");
            IssuerError::Signing(e)
        })?;

        tracing::info!(
            subject = %claims.sub,
            role = %claims.role,
            privileged = claims.is_privileged_subject(),
            expires_at = ?claims.expires_at(),
            "issued token"
        );
        Ok(SignedToken { compact, claims })
    }

    /// Signs a `USER` token for `user_id`.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue`].
    pub fn issue_user_token(&self, user_id: UserId) -> Result<SignedToken> {
        self.issue(Grant::User(user_id))
    }

    /// Signs a `PRIVILEGED` token for service-to-service calls.
    ///
    /// Never expose this behind a caller-controlled input.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue`].
    pub fn issue_privileged_token(&self) -> Result<SignedToken> {
        self.issue(Grant::Privileged)
    }

    /// The `iss` claim this issuer stamps.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The lifetime of issued tokens.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The key id of the active signing key.
    #[must_use]
    pub fn kid(&self) -> &str {
        self.material.kid()
    }

    /// A publisher for this issuer's public key set.
    #[must_use]
    pub fn publisher(&self) -> PublicKeySetPublisher {
        PublicKeySetPublisher::new(&self.material)
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("material", &self.material)
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::LazyLock;

    use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
    use tollgate_keys::{KeyKind, PRIVILEGED_SUBJECT, Role};

    use super::*;

    static RSA_ISSUER: LazyLock<TokenIssuer> = LazyLock::new(|| {
        TokenIssuer::from_config(&IssuerConfig::default()).expect("default issuer")
    });

    fn ed_issuer() -> TokenIssuer {
        let material = KeyMaterial::generate("ed-kid", KeyKind::Ed25519).unwrap();
        TokenIssuer::builder().material(Arc::new(material)).issuer("issuer-under-test").build()
    }

    fn verify(issuer: &TokenIssuer, token: &SignedToken) -> Claims {
        let set = issuer.publisher().current_key_set();
        let jwk = set.find(issuer.kid()).unwrap();
        let key = jwk.decoding_key().unwrap();
        decode::<Claims>(token.as_str(), &key, &Validation::new(jwk.algorithm())).unwrap().claims
    }

    #[test]
    fn test_user_token_claims() {
        let before = unix_now();
        let token = RSA_ISSUER.issue_user_token(42).unwrap();
        let claims = token.claims();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.iss, "auth-server");
        assert_eq!(claims.role, Role::User);
        assert!(claims.iat >= before);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert!(!claims.is_privileged_subject());
        let expires_at = claims.expires_at().expect("exp fits a timestamp");
        assert_eq!(u64::try_from(expires_at.timestamp()).unwrap(), claims.exp);
    }

    #[test]
    fn test_header_carries_constant_kid_and_rs256() {
        let first = decode_header(RSA_ISSUER.issue_user_token(1).unwrap().as_str()).unwrap();
        let second = decode_header(RSA_ISSUER.issue_privileged_token().unwrap().as_str()).unwrap();

        assert_eq!(first.alg, Algorithm::RS256);
        assert_eq!(first.kid.as_deref(), Some("auth-server-key-id"));
        assert_eq!(first.kid, second.kid);
    }

    #[test]
    fn test_privileged_token_uses_sentinel_subject() {
        let token = RSA_ISSUER.issue_privileged_token().unwrap();
        assert_eq!(token.claims().sub, PRIVILEGED_SUBJECT);
        assert_eq!(token.claims().role, Role::Privileged);
        assert!(token.claims().is_privileged_subject());
    }

    #[test]
    fn test_signed_claims_match_returned_claims() {
        let token = RSA_ISSUER.issue_user_token(9).unwrap();
        assert_eq!(&verify(&RSA_ISSUER, &token), token.claims());
    }

    #[test]
    fn test_ed25519_issuer() {
        let issuer = ed_issuer();
        let token = issuer.issue_user_token(5).unwrap();

        assert_eq!(decode_header(token.as_str()).unwrap().alg, Algorithm::EdDSA);
        assert_eq!(verify(&issuer, &token).iss, "issuer-under-test");
    }

    #[test]
    fn test_custom_ttl() {
        let material = KeyMaterial::generate("k", KeyKind::Ed25519).unwrap();
        let issuer = TokenIssuer::builder()
            .material(Arc::new(material))
            .ttl(Duration::from_secs(60))
            .build();
        let claims = issuer.issue_privileged_token().unwrap().claims().clone();
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_bearer_and_debug() {
        let token = ed_issuer().issue_user_token(3).unwrap();
        assert_eq!(token.bearer(), format!("Bearer {}", token.as_str()));
        assert!(!format!("{token:?}").contains(token.as_str()));
    }
}
