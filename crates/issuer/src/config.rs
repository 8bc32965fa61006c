//! Issuer configuration.
//!
//! [`IssuerConfig`] deserializes from any serde source and is also buildable
//! in code through its validating builder.
//!
//! ```no_run
//! use std::time::Duration;
//! use tollgate_issuer::IssuerConfig;
//!
//! let config = IssuerConfig::builder()
//!     .issuer("auth-server")
//!     .token_ttl(Duration::from_secs(15 * 60))
//!     .private_key_path("/etc/tollgate/signing.pem")
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use tollgate_keys::{ConfigError, KeyKind, KeyMaterial, validate_kid};
use zeroize::Zeroizing;

use crate::error::{IssuerError, Result};

/// Default `iss` claim.
pub const DEFAULT_ISSUER: &str = "auth-server";

/// Default key id carried in token headers and the published key set.
pub const DEFAULT_KEY_ID: &str = "auth-server-key-id";

/// Default token lifetime (15 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Shortest accepted token lifetime.
const MIN_TOKEN_TTL: Duration = Duration::from_secs(1);

/// Configuration for [`TokenIssuer`](crate::TokenIssuer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerConfig {
    /// Value of the `iss` claim.
    #[serde(default = "default_issuer")]
    pub(crate) issuer: String,

    /// Key id of the active signing key.
    #[serde(default = "default_key_id")]
    pub(crate) key_id: String,

    /// Lifetime of issued tokens.
    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    pub(crate) token_ttl: Duration,

    /// Kind of keypair to generate when no key file is configured.
    #[serde(default)]
    pub(crate) key_kind: KeyKind,

    /// PEM-encoded RSA private key to sign with instead of a generated one.
    #[serde(default)]
    pub(crate) private_key_path: Option<PathBuf>,
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_owned()
}

fn default_key_id() -> String {
    DEFAULT_KEY_ID.to_owned()
}

fn default_token_ttl() -> Duration {
    DEFAULT_TOKEN_TTL
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            key_id: default_key_id(),
            token_ttl: DEFAULT_TOKEN_TTL,
            key_kind: KeyKind::default(),
            private_key_path: None,
        }
    }
}

#[bon::bon]
impl IssuerConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `issuer` - `iss` claim (default: `auth-server`).
    /// * `key_id` - Signing key id (default: `auth-server-key-id`).
    /// * `token_ttl` - Token lifetime (default: 15 minutes).
    /// * `key_kind` - Generated key kind (default: RSA).
    /// * `private_key_path` - PEM file to load instead of generating a key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `issuer` or `key_id` is empty, `key_id`
    /// has characters outside `[A-Za-z0-9._:-]`, or `token_ttl` is shorter
    /// than one second.
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_ISSUER.to_owned())] issuer: String,
        #[builder(into, default = DEFAULT_KEY_ID.to_owned())] key_id: String,
        #[builder(default = DEFAULT_TOKEN_TTL)] token_ttl: Duration,
        #[builder(default)] key_kind: KeyKind,
        #[builder(into)] private_key_path: Option<PathBuf>,
    ) -> std::result::Result<Self, ConfigError> {
        let config = Self { issuer, key_id, token_ttl, key_kind, private_key_path };
        config.validate()?;
        Ok(config)
    }

    /// Re-checks the invariants enforced by the builder.
    ///
    /// Deserialized configs bypass the builder, so consumers call this before use.
    ///
    /// # Errors
    ///
    /// See [`IssuerConfig::new`].
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Empty { field: "issuer" });
        }
        if self.key_id.trim().is_empty() {
            return Err(ConfigError::Empty { field: "key_id" });
        }
        validate_kid(&self.key_id)
            .map_err(|e| ConfigError::Invalid { field: "key_id", reason: e.to_string() })?;
        if self.token_ttl < MIN_TOKEN_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "token_ttl",
                value: format!("{}ms", self.token_ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        if self.private_key_path.is_some() && self.key_kind != KeyKind::Rsa {
            return Err(ConfigError::Invalid {
                field: "key_kind",
                reason: "key files are only supported for RSA keys".to_owned(),
            });
        }
        Ok(())
    }

    /// Returns the `iss` claim value.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the signing key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the token lifetime.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Returns the kind of key generated when no key file is set.
    #[must_use]
    pub fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    /// Returns the configured private key path, if any.
    #[must_use]
    pub fn private_key_path(&self) -> Option<&PathBuf> {
        self.private_key_path.as_ref()
    }

    /// Loads the configured key file, or generates a fresh keypair.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::KeyFile`] if the key file cannot be read and
    /// [`IssuerError::KeyMaterial`] if the key cannot be parsed or generated.
    pub fn key_material(&self) -> Result<KeyMaterial> {
        match &self.private_key_path {
            Some(path) => {
                let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
                    IssuerError::KeyFile { path: path.display().to_string(), source }
                })?);
                KeyMaterial::from_rsa_pem(&self.key_id, &pem).map_err(IssuerError::KeyMaterial)
            },
            None => KeyMaterial::generate(&self.key_id, self.key_kind)
                .map_err(IssuerError::KeyMaterial),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = IssuerConfig::builder().build().unwrap();
        assert_eq!(config.issuer(), "auth-server");
        assert_eq!(config.key_id(), "auth-server-key-id");
        assert_eq!(config.token_ttl(), Duration::from_secs(900));
        assert_eq!(config.key_kind(), KeyKind::Rsa);
        assert!(config.private_key_path().is_none());
        assert_eq!(config, IssuerConfig::default());
    }

    #[rstest]
    #[case::empty_issuer("", "auth-server-key-id", "issuer")]
    #[case::blank_issuer("  ", "auth-server-key-id", "issuer")]
    #[case::empty_key_id("auth-server", "", "key_id")]
    #[case::key_id_with_space("auth-server", "auth server key", "key_id")]
    #[case::key_id_with_slash("auth-server", "keys/active", "key_id")]
    fn test_bad_names_rejected(#[case] issuer: &str, #[case] key_id: &str, #[case] field: &str) {
        let err = IssuerConfig::builder().issuer(issuer).key_id(key_id).build().unwrap_err();
        let rejected = match err {
            ConfigError::Empty { field } | ConfigError::Invalid { field, .. } => field,
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(rejected, field);
    }

    #[test]
    fn test_deserialized_key_id_checked_by_validate() {
        let json = r#"{"key_id":"auth server key"}"#;
        let config: IssuerConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "key_id", .. })));
    }

    #[test]
    fn test_sub_second_ttl_rejected() {
        let err = IssuerConfig::builder().token_ttl(Duration::from_millis(10)).build().unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "token_ttl", .. }));
    }

    #[test]
    fn test_key_file_requires_rsa() {
        let err = IssuerConfig::builder()
            .key_kind(KeyKind::Ed25519)
            .private_key_path("/tmp/key.pem")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "key_kind", .. }));
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let json = r#"{"issuer":"issuer-a","token_ttl":"5m","key_kind":"ed25519"}"#;
        let config: IssuerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.issuer(), "issuer-a");
        assert_eq!(config.key_id(), DEFAULT_KEY_ID);
        assert_eq!(config.token_ttl(), Duration::from_secs(300));
        assert_eq!(config.key_kind(), KeyKind::Ed25519);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let json = r#"{"issuer":"a","audience":"b"}"#;
        assert!(serde_json::from_str::<IssuerConfig>(json).is_err());
    }

    #[test]
    fn test_missing_key_file_reported() {
        let config = IssuerConfig::builder()
            .private_key_path("/nonexistent/tollgate/signing.pem")
            .build()
            .unwrap();
        assert!(matches!(config.key_material(), Err(IssuerError::KeyFile { .. })));
    }

    #[test]
    fn test_generates_configured_kind() {
        let config = IssuerConfig::builder().key_kind(KeyKind::Ed25519).key_id("k1").build().unwrap();
        let material = config.key_material().unwrap();
        assert_eq!(material.kid(), "k1");
        assert_eq!(material.kind(), KeyKind::Ed25519);
    }
}
