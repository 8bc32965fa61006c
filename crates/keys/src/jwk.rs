//! Public key set wire format.
//!
//! The issuer publishes its verification keys as a standard JWK set:
//!
//! ```json
//! {"keys":[{"kty":"RSA","kid":"auth-server-key-id","use":"sig","alg":"RS256","n":"...","e":"AQAB"}]}
//! ```
//!
//! Each entry is decoded into the tagged union [`Jwk`]. Unknown `kty` values
//! are rejected with [`KeyError::UnsupportedKeyKind`] rather than skipped, so
//! a verifier never silently loses a key it was expected to trust.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};

/// Smallest RSA modulus accepted from a key set.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// Curve name for Ed25519 OKP keys.
pub const ED25519_CURVE: &str = "Ed25519";

/// Longest accepted key id.
pub const MAX_KID_LENGTH: usize = 128;

/// Why a key id has an unacceptable shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidKid {
    /// The id is empty.
    #[error("kid is empty")]
    Empty,
    /// The id is longer than [`MAX_KID_LENGTH`] bytes.
    #[error("kid is {len} bytes, maximum is {MAX_KID_LENGTH}")]
    TooLong {
        /// Length of the rejected id in bytes.
        len: usize,
    },
    /// The id contains a character outside `[A-Za-z0-9._:-]`.
    #[error("kid contains disallowed character {0:?}")]
    DisallowedChar(char),
}

/// Checks that `kid` is 1 to [`MAX_KID_LENGTH`] characters from `[A-Za-z0-9._:-]`.
///
/// Issuers and verifiers share this check, so any id an issuer accepts is
/// one a verifier will look up.
///
/// # Errors
///
/// Returns the first [`InvalidKid`] problem found.
///
/// # Examples
///
/// ```
/// use tollgate_keys::validate_kid;
///
/// assert!(validate_kid("auth-server-key-id").is_ok());
/// assert!(validate_kid("auth server key").is_err());
/// ```
pub fn validate_kid(kid: &str) -> Result<(), InvalidKid> {
    if kid.is_empty() {
        return Err(InvalidKid::Empty);
    }
    if kid.len() > MAX_KID_LENGTH {
        return Err(InvalidKid::TooLong { len: kid.len() });
    }
    if let Some(bad) =
        kid.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
    {
        return Err(InvalidKid::DisallowedChar(bad));
    }
    Ok(())
}

/// RSA public key components (base64url, no padding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaPublicJwk {
    /// Key identifier.
    pub kid: String,
    /// Modulus.
    pub n: String,
    /// Public exponent.
    pub e: String,
}

/// Octet key pair (Ed25519) public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OkpPublicJwk {
    /// Key identifier.
    pub kid: String,
    /// Curve name. Only [`ED25519_CURVE`] is accepted.
    pub crv: String,
    /// The 32-byte public key (base64url, no padding).
    pub x: String,
}

/// A single public verification key, dispatched on its `kty`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JwkWire", into = "JwkWire")]
pub enum Jwk {
    /// `kty: "RSA"`, verified with RS256.
    Rsa(RsaPublicJwk),
    /// `kty: "OKP"`, verified with EdDSA.
    Okp(OkpPublicJwk),
}

impl Jwk {
    /// The key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        match self {
            Self::Rsa(key) => &key.kid,
            Self::Okp(key) => &key.kid,
        }
    }

    /// The wire `kty` of this key.
    #[must_use]
    pub fn kty(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::Okp(_) => "OKP",
        }
    }

    /// The only signature algorithm this key verifies.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::RS256,
            Self::Okp(_) => Algorithm::EdDSA,
        }
    }

    /// Builds a [`DecodingKey`] for signature verification.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPublicKey`] if the encoded components are
    /// rejected by the verifier backend.
    pub fn decoding_key(&self) -> KeyResult<DecodingKey> {
        match self {
            Self::Rsa(key) => DecodingKey::from_rsa_components(&key.n, &key.e).map_err(|e| {
                KeyError::invalid_public_key(format!("RSA key '{}': {e}", key.kid))
            }),
            Self::Okp(key) => DecodingKey::from_ed_components(&key.x).map_err(|e| {
                KeyError::invalid_public_key(format!("Ed25519 key '{}': {e}", key.kid))
            }),
        }
    }
}

/// Flat JSON shape shared by every key kind.
#[derive(Debug, Serialize, Deserialize)]
struct JwkWire {
    kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<String>,
}

fn required(value: Option<String>, field: &str, kty: &str) -> KeyResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| KeyError::invalid_public_key(format!("{kty} key missing '{field}'")))
}

fn decode_component(value: &str, field: &str) -> KeyResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| KeyError::invalid_public_key(format!("'{field}' is not base64url: {e}")))
}

impl TryFrom<JwkWire> for Jwk {
    type Error = KeyError;

    fn try_from(wire: JwkWire) -> KeyResult<Self> {
        if let Some(key_use) = &wire.key_use
            && key_use != "sig"
        {
            return Err(KeyError::invalid_public_key(format!("unsupported key use '{key_use}'")));
        }

        let jwk = match wire.kty.as_str() {
            "RSA" => {
                let kid = required(wire.kid, "kid", "RSA")?;
                let n = required(wire.n, "n", "RSA")?;
                let e = required(wire.e, "e", "RSA")?;

                let modulus = decode_component(&n, "n")?;
                let significant = modulus.iter().skip_while(|b| **b == 0).count();
                if significant * 8 < MIN_RSA_MODULUS_BITS {
                    return Err(KeyError::invalid_public_key(format!(
                        "RSA key '{kid}' modulus is shorter than {MIN_RSA_MODULUS_BITS} bits"
                    )));
                }
                decode_component(&e, "e")?;

                Jwk::Rsa(RsaPublicJwk { kid, n, e })
            },
            "OKP" => {
                let kid = required(wire.kid, "kid", "OKP")?;
                let crv = required(wire.crv, "crv", "OKP")?;
                let x = required(wire.x, "x", "OKP")?;

                if crv != ED25519_CURVE {
                    return Err(KeyError::invalid_public_key(format!(
                        "OKP key '{kid}' uses unsupported curve '{crv}'"
                    )));
                }
                let raw = decode_component(&x, "x")?;
                if raw.len() != 32 {
                    return Err(KeyError::invalid_public_key(format!(
                        "OKP key '{kid}' must be 32 bytes, got {}",
                        raw.len()
                    )));
                }

                Jwk::Okp(OkpPublicJwk { kid, crv, x })
            },
            other => return Err(KeyError::unsupported_key_kind(other)),
        };

        if let Some(alg) = &wire.alg {
            let expected = format!("{:?}", jwk.algorithm());
            if *alg != expected {
                return Err(KeyError::invalid_public_key(format!(
                    "{} key '{}' declares alg '{alg}', expected '{expected}'",
                    jwk.kty(),
                    jwk.kid()
                )));
            }
        }

        Ok(jwk)
    }
}

impl From<Jwk> for JwkWire {
    fn from(jwk: Jwk) -> Self {
        let alg = Some(format!("{:?}", jwk.algorithm()));
        let kty = jwk.kty().to_owned();
        match jwk {
            Jwk::Rsa(key) => JwkWire {
                kty,
                kid: Some(key.kid),
                key_use: Some("sig".to_owned()),
                alg,
                n: Some(key.n),
                e: Some(key.e),
                crv: None,
                x: None,
            },
            Jwk::Okp(key) => JwkWire {
                kty,
                kid: Some(key.kid),
                key_use: Some("sig".to_owned()),
                alg,
                n: None,
                e: None,
                crv: Some(key.crv),
                x: Some(key.x),
            },
        }
    }
}

/// An ordered set of public keys, looked up by key id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeySet {
    keys: Vec<Jwk>,
}

/// Document shape used for typed parsing in [`PublicKeySet::from_json`].
#[derive(Deserialize)]
struct KeySetDocument {
    keys: Vec<JwkWire>,
}

impl PublicKeySet {
    /// Creates a key set from the given keys, preserving order.
    #[must_use]
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Parses a JWK set document.
    ///
    /// # Errors
    ///
    /// - [`KeyError::MalformedKeySet`] if the bytes are not a `{"keys":[...]}` document
    /// - [`KeyError::UnsupportedKeyKind`] if any entry has an unknown `kty`
    /// - [`KeyError::InvalidPublicKey`] if any entry is incomplete or undecodable
    pub fn from_json(bytes: &[u8]) -> KeyResult<Self> {
        let document: KeySetDocument = serde_json::from_slice(bytes)
            .map_err(|e| KeyError::malformed_key_set_with_source("invalid JWK set JSON", e))?;

        let keys = document.keys.into_iter().map(Jwk::try_from).collect::<KeyResult<Vec<_>>>()?;

        Ok(Self { keys })
    }

    /// Finds the first key whose id equals `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid() == kid)
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the keys in publication order.
    pub fn iter(&self) -> impl Iterator<Item = &Jwk> {
        self.keys.iter()
    }

    /// Key ids in publication order.
    #[must_use]
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.iter().map(Jwk::kid).collect()
    }
}
