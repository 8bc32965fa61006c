//! Issuer signing key material.
//!
//! [`KeyMaterial`] owns the private half of the issuer's single active
//! keypair together with its constant key id. The private key never leaves
//! this type: callers get signed compact tokens from [`KeyMaterial::sign`] and
//! the publishable half from [`KeyMaterial::public_jwk`].

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand_core::OsRng;
use rsa::{
    RsaPrivateKey,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    pkcs8::DecodePrivateKey,
    traits::PublicKeyParts,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::{KeyError, KeyResult},
    jwk::{
        ED25519_CURVE, Jwk, MIN_RSA_MODULUS_BITS, OkpPublicJwk, PublicKeySet, RsaPublicJwk,
        validate_kid,
    },
};

/// Modulus size used when generating RSA keys.
pub const RSA_KEY_BITS: usize = 2048;

/// The kind of keypair an issuer signs with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// RSA 2048, signing with RS256.
    #[default]
    Rsa,
    /// Ed25519, signing with EdDSA.
    Ed25519,
}

impl KeyKind {
    /// The JWS algorithm produced by this key kind.
    #[must_use]
    pub fn algorithm(self) -> Algorithm {
        match self {
            Self::Rsa => Algorithm::RS256,
            Self::Ed25519 => Algorithm::EdDSA,
        }
    }
}

/// The issuer's active signing keypair.
pub struct KeyMaterial {
    kid: String,
    kind: KeyKind,
    encoding_key: EncodingKey,
    public: Jwk,
}

impl KeyMaterial {
    /// Generates a fresh keypair of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPrivateKey`] if key generation fails or
    /// `kid` fails [`validate_kid`].
    pub fn generate(kid: impl Into<String>, kind: KeyKind) -> KeyResult<Self> {
        match kind {
            KeyKind::Rsa => Self::generate_rsa(kid),
            KeyKind::Ed25519 => Self::generate_ed25519(kid),
        }
    }

    /// Generates a fresh RSA 2048 keypair.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPrivateKey`] if key generation fails or
    /// `kid` fails [`validate_kid`].
    pub fn generate_rsa(kid: impl Into<String>) -> KeyResult<Self> {
        let kid = checked_kid(kid.into())?;
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| KeyError::invalid_private_key_with_source("RSA key generation failed", e))?;
        Self::from_rsa_private(kid, &private)
    }

    /// Generates a fresh Ed25519 keypair.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPrivateKey`] if `kid` fails [`validate_kid`].
    pub fn generate_ed25519(kid: impl Into<String>) -> KeyResult<Self> {
        let kid = checked_kid(kid.into())?;
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

        let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
        let mut pkcs8_der = Zeroizing::new(vec![
            0x30, 0x2e, // SEQUENCE, 46 bytes
            0x02, 0x01, 0x00, // INTEGER version 0
            0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
            0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
            0x04, 0x22, // OCTET STRING, 34 bytes
            0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
        ]);
        pkcs8_der.extend_from_slice(&*private_bytes);

        Ok(Self {
            encoding_key: EncodingKey::from_ed_der(&pkcs8_der),
            public: Jwk::Okp(OkpPublicJwk { kid: kid.clone(), crv: ED25519_CURVE.to_owned(), x }),
            kind: KeyKind::Ed25519,
            kid,
        })
    }

    /// Loads an RSA private key from PEM (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPrivateKey`] if the PEM cannot be parsed,
    /// the key fails consistency checks, or the modulus is shorter than
    /// [`MIN_RSA_MODULUS_BITS`].
    pub fn from_rsa_pem(kid: impl Into<String>, pem: &str) -> KeyResult<Self> {
        let kid = checked_kid(kid.into())?;
        let private = match RsaPrivateKey::from_pkcs1_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| {
                KeyError::invalid_private_key_with_source("not a PKCS#1 or PKCS#8 RSA key", e)
            })?,
        };
        private
            .validate()
            .map_err(|e| KeyError::invalid_private_key_with_source("RSA key is inconsistent", e))?;
        if private.size() * 8 < MIN_RSA_MODULUS_BITS {
            return Err(KeyError::invalid_private_key(format!(
                "RSA modulus must be at least {MIN_RSA_MODULUS_BITS} bits, got {}",
                private.size() * 8
            )));
        }
        Self::from_rsa_private(kid, &private)
    }

    fn from_rsa_private(kid: String, private: &RsaPrivateKey) -> KeyResult<Self> {
        // SecretDocument zeroizes its buffer on drop.
        let der = private
            .to_pkcs1_der()
            .map_err(|e| KeyError::invalid_private_key_with_source("RSA key encoding failed", e))?;

        let n = URL_SAFE_NO_PAD.encode(private.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(private.e().to_bytes_be());

        Ok(Self {
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
            public: Jwk::Rsa(RsaPublicJwk { kid: kid.clone(), n, e }),
            kind: KeyKind::Rsa,
            kid,
        })
    }

    /// The key id carried in every token header and key-set entry.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The kind of this keypair.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// The JWS algorithm tokens are signed with.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.kind.algorithm()
    }

    /// The public half as a JWK entry.
    #[must_use]
    pub fn public_jwk(&self) -> &Jwk {
        &self.public
    }

    /// A key set containing only this key.
    #[must_use]
    pub fn public_key_set(&self) -> PublicKeySet {
        PublicKeySet::new(vec![self.public.clone()])
    }

    /// Signs `claims` into a compact token whose header carries this key's id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Signing`] if the signing primitive fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> KeyResult<String> {
        let mut header = Header::new(self.algorithm());
        header.kid = Some(self.kid.clone());

        jsonwebtoken::encode(&header, claims, &self.encoding_key)
            .map_err(|e| KeyError::signing_with_source("failed to sign token", e))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kid", &self.kid)
            .field("kind", &self.kind)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

fn checked_kid(kid: String) -> KeyResult<String> {
    validate_kid(&kid)
        .map_err(|e| KeyError::invalid_private_key(format!("invalid key id: {e}")))?;
    Ok(kid)
}
