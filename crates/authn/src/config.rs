//! Verifier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tollgate_keys::ConfigError;

use crate::key_set_cache::{DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_SET_TTL, StalePolicy};

/// Shortest accepted cache TTL.
const MIN_CACHE_TTL: Duration = Duration::from_secs(1);

/// Shortest accepted fetch timeout.
const MIN_FETCH_TIMEOUT: Duration = Duration::from_millis(10);

/// Longest accepted cache TTL and serve-stale bound.
const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the verifier side: where to fetch keys and how to cache them.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tollgate_authn::{StalePolicy, VerifierConfig};
///
/// let config = VerifierConfig::builder()
///     .jwks_url("http://auth-server:8080/auth/jwks")
///     .stale_policy(StalePolicy::ServeStale { max_staleness: Duration::from_secs(300) })
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// URL of the issuer's key set endpoint.
    pub(crate) jwks_url: String,

    /// How long a fetched key set is considered fresh.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub(crate) cache_ttl: Duration,

    /// Bound on a single key set fetch.
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub(crate) fetch_timeout: Duration,

    /// Behavior when a refresh fails.
    #[serde(default)]
    pub(crate) stale_policy: StalePolicy,

    /// Coalesce concurrent refreshes into one fetch.
    #[serde(default)]
    pub(crate) single_flight: bool,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_KEY_SET_TTL
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

#[bon::bon]
impl VerifierConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - HTTP(S) URL of the key set endpoint.
    ///
    /// # Optional Fields
    ///
    /// * `cache_ttl` - Key set freshness window (default: 15 minutes).
    /// * `fetch_timeout` - Bound on one fetch (default: 5 seconds).
    /// * `stale_policy` - Refresh failure behavior (default: fail closed).
    /// * `single_flight` - Coalesce concurrent refreshes (default: false).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is empty or not HTTP(S), a
    /// duration is below its minimum, or the cache TTL or serve-stale bound
    /// exceeds one day.
    #[builder]
    pub fn new(
        #[builder(into)] jwks_url: String,
        #[builder(default = DEFAULT_KEY_SET_TTL)] cache_ttl: Duration,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] fetch_timeout: Duration,
        #[builder(default)] stale_policy: StalePolicy,
        #[builder(default)] single_flight: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self { jwks_url, cache_ttl, fetch_timeout, stale_policy, single_flight };
        config.validate()?;
        Ok(config)
    }

    /// Re-checks the invariants enforced by the builder.
    ///
    /// # Errors
    ///
    /// See [`VerifierConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwks_url.trim().is_empty() {
            return Err(ConfigError::Empty { field: "jwks_url" });
        }
        if !(self.jwks_url.starts_with("http://") || self.jwks_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "jwks_url",
                reason: format!("'{}' is not an http(s) URL", self.jwks_url),
            });
        }
        if self.cache_ttl < MIN_CACHE_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "cache_ttl",
                value: format!("{}ms", self.cache_ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        if self.fetch_timeout < MIN_FETCH_TIMEOUT {
            return Err(ConfigError::BelowMinimum {
                field: "fetch_timeout",
                value: format!("{}ms", self.fetch_timeout.as_millis()),
                min: "10ms".to_owned(),
            });
        }
        if self.cache_ttl > MAX_WINDOW {
            return Err(ConfigError::Invalid {
                field: "cache_ttl",
                reason: format!("{}s exceeds the one day maximum", self.cache_ttl.as_secs()),
            });
        }
        if let StalePolicy::ServeStale { max_staleness } = self.stale_policy
            && max_staleness > MAX_WINDOW
        {
            return Err(ConfigError::Invalid {
                field: "max_staleness",
                reason: format!("{}s exceeds the one day maximum", max_staleness.as_secs()),
            });
        }
        Ok(())
    }

    /// Returns the key set endpoint URL.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Returns the key set freshness window.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Returns the fetch timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Returns the stale policy.
    #[must_use]
    pub fn stale_policy(&self) -> StalePolicy {
        self.stale_policy
    }

    /// Returns whether concurrent refreshes are coalesced.
    #[must_use]
    pub fn single_flight(&self) -> bool {
        self.single_flight
    }
}
