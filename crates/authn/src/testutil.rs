//! Shared test utilities for verifier testing.
//!
//! This module provides shared signing keys, helpers for minting valid,
//! expired, and hand-crafted tokens, and a scriptable [`KeySetFetcher`]. It
//! is feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! tollgate-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use tollgate_authn::testutil::{test_key_material, user_token, verifier_for};
//! ```
#![allow(clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use tollgate_keys::{Claims, Grant, KeyKind, KeyMaterial, PublicKeySet, UserId, unix_now};

use crate::{
    error::FetchError, fetcher::KeySetFetcher, key_set_cache::KeySetCache, verifier::TokenVerifier,
};

/// Key id used by the shared test keys.
pub const TEST_KID: &str = "test-key-id";

/// Lifetime of tokens minted by these helpers.
pub const TEST_TOKEN_TTL_SECS: u64 = 15 * 60;

static TEST_KEY: LazyLock<KeyMaterial> = LazyLock::new(|| {
    KeyMaterial::generate(TEST_KID, KeyKind::Rsa).expect("failed to generate test RSA key")
});

static FOREIGN_KEY: LazyLock<KeyMaterial> = LazyLock::new(|| {
    KeyMaterial::generate(TEST_KID, KeyKind::Rsa).expect("failed to generate foreign RSA key")
});

/// A process-wide RSA key with id [`TEST_KID`].
///
/// RSA generation is slow, so the key is created once and shared.
pub fn test_key_material() -> &'static KeyMaterial {
    &TEST_KEY
}

/// A second RSA key that reuses [`TEST_KID`] but is not published anywhere.
///
/// Tokens signed with it must fail signature verification.
pub fn foreign_key_material() -> &'static KeyMaterial {
    &FOREIGN_KEY
}

/// Signs arbitrary claims with `material`.
///
/// # Panics
///
/// Panics if signing fails.
pub fn sign_claims(material: &KeyMaterial, claims: &Claims) -> String {
    material.sign(claims).expect("failed to sign test token")
}

/// Mints a valid token for `grant`, expiring [`TEST_TOKEN_TTL_SECS`] from now.
pub fn token_for(material: &KeyMaterial, grant: Grant) -> String {
    sign_claims(material, &Claims::for_grant(grant, "auth-server", unix_now(), TEST_TOKEN_TTL_SECS))
}

/// Mints a valid `USER` token for `user_id`.
pub fn user_token(material: &KeyMaterial, user_id: UserId) -> String {
    token_for(material, Grant::User(user_id))
}

/// Mints a valid `PRIVILEGED` token.
pub fn privileged_token(material: &KeyMaterial) -> String {
    token_for(material, Grant::Privileged)
}

/// Mints a correctly signed token for `grant` that expired `ago_secs` seconds ago.
pub fn expired_token(material: &KeyMaterial, grant: Grant, ago_secs: u64) -> String {
    let exp = unix_now().saturating_sub(ago_secs);
    let issued_at = exp.saturating_sub(TEST_TOKEN_TTL_SECS);
    let claims = Claims::for_grant(grant, "auth-server", issued_at, TEST_TOKEN_TTL_SECS);
    sign_claims(material, &claims)
}

/// Formats an `Authorization` header value.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Creates a raw token string from arbitrary header and payload JSON.
///
/// The resulting token has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack tokens (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Serve,
    Fail,
    Hang,
}

/// A [`KeySetFetcher`] whose behavior tests can switch at runtime.
///
/// Serves its key set until told to [`fail`](Self::fail) or
/// [`hang`](Self::hang); counts every call.
#[derive(Debug)]
pub struct ScriptedFetcher {
    key_set: Mutex<PublicKeySet>,
    mode: Mutex<Mode>,
    queued: Mutex<VecDeque<Result<PublicKeySet, FetchError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// A fetcher that returns `key_set` on every call.
    pub fn serving(key_set: PublicKeySet) -> Self {
        Self {
            key_set: Mutex::new(key_set),
            mode: Mutex::new(Mode::Serve),
            queued: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` (on the tokio clock) before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a one-off response, used before the steady-state mode applies.
    pub fn push_response(&self, response: Result<PublicKeySet, FetchError>) {
        self.queued.lock().push_back(response);
    }

    /// Makes subsequent calls fail.
    pub fn fail(&self) {
        *self.mode.lock() = Mode::Fail;
    }

    /// Makes subsequent calls never complete.
    pub fn hang(&self) {
        *self.mode.lock() = Mode::Hang;
    }

    /// Makes subsequent calls succeed again.
    pub fn recover(&self) {
        *self.mode.lock() = Mode::Serve;
    }

    /// Changes the key set returned by subsequent successful calls.
    pub fn replace_key_set(&self, key_set: PublicKeySet) {
        *self.key_set.lock() = key_set;
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<PublicKeySet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.queued.lock().pop_front();
        if let Some(response) = queued {
            return response;
        }

        let mode = *self.mode.lock();
        match mode {
            Mode::Serve => Ok(self.key_set.lock().clone()),
            Mode::Fail => Err(FetchError::other("scripted fetch failure")),
            Mode::Hang => std::future::pending().await,
        }
    }
}

/// A cache that always serves `material`'s public key set.
pub fn cache_for(material: &KeyMaterial) -> (Arc<KeySetCache>, Arc<ScriptedFetcher>) {
    let fetcher = Arc::new(ScriptedFetcher::serving(material.public_key_set()));
    let cache = Arc::new(KeySetCache::builder().fetcher(fetcher.clone()).build());
    (cache, fetcher)
}

/// A verifier trusting only `material`'s public key.
pub fn verifier_for(material: &KeyMaterial) -> TokenVerifier {
    TokenVerifier::new(cache_for(material).0)
}

/// Asserts that a `Result<Verdict, AuthError>` is `Ok(Verdict::Deny(reason))`
/// with the given [`DenyReason`](crate::DenyReason) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use tollgate_authn::{assert_deny, AuthError, DenyReason, Verdict};
///
/// let result: Result<Verdict, AuthError> = Ok(Verdict::Deny(DenyReason::Expired));
/// assert_deny!(result, Expired);
/// ```
#[macro_export]
macro_rules! assert_deny {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!(
                $result,
                Ok($crate::verifier::Verdict::Deny($crate::verifier::DenyReason::$variant))
            ),
            "expected Deny({}), got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!(
                $result,
                Ok($crate::verifier::Verdict::Deny($crate::verifier::DenyReason::$variant))
            ),
            "{}: expected Deny({}), got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
