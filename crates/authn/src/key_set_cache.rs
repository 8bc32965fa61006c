//! Cached access to the issuer's public key set.
//!
//! The cache holds at most one entry: the last successfully fetched key set
//! and the instant it was fetched. Reads are lock-free apart from a short
//! read lock; a stale or missing entry triggers a fetch on the calling task
//! and the entry is replaced wholesale on success.
//!
//! # Staleness
//!
//! An entry is stale once `now - fetched_at > ttl`. There is no background
//! refresh. By default ([`StalePolicy::FailClosed`]) a failed refresh is an
//! error even if an older entry exists; [`StalePolicy::ServeStale`] allows a
//! bounded grace period instead.
//!
//! # Concurrency
//!
//! Without single-flight, every caller that observes a stale entry fetches.
//! With `single_flight(true)`, callers queue behind one refresh and re-check
//! the entry once it completes.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use fail::fail_point;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};
use tollgate_keys::PublicKeySet;

use crate::{
    config::VerifierConfig,
    error::{AuthError, FetchError, Result},
    fetcher::{HttpKeySetFetcher, KeySetFetcher},
};

/// Default time a fetched key set is considered fresh (15 minutes).
pub const DEFAULT_KEY_SET_TTL: Duration = Duration::from_secs(15 * 60);

/// Default bound on a single fetch (5 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when refreshing a stale entry fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StalePolicy {
    /// Report [`AuthError::KeySetUnavailable`].
    #[default]
    FailClosed,
    /// Keep serving the previous entry until it is `ttl + max_staleness` old.
    ServeStale {
        /// Grace period beyond the TTL.
        #[serde(with = "humantime_serde")]
        max_staleness: Duration,
    },
}

struct CacheEntry {
    key_set: Arc<PublicKeySet>,
    fetched_at: Instant,
}

/// Lazily refreshed cache of the issuer's public key set.
pub struct KeySetCache {
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    fetch_timeout: Duration,
    stale_policy: StalePolicy,
    refresh_gate: Option<Mutex<()>>,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    fetches: AtomicU64,
}

#[bon::bon]
impl KeySetCache {
    /// Creates an empty cache over `fetcher`.
    ///
    /// # Optional Fields
    ///
    /// * `ttl` - Freshness window (default: 15 minutes).
    /// * `fetch_timeout` - Bound on one fetch (default: 5 seconds).
    /// * `stale_policy` - Behavior on refresh failure (default: fail closed).
    /// * `single_flight` - Coalesce concurrent refreshes (default: off).
    #[builder]
    pub fn new(
        fetcher: Arc<dyn KeySetFetcher>,
        #[builder(default = DEFAULT_KEY_SET_TTL)] ttl: Duration,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] fetch_timeout: Duration,
        #[builder(default)] stale_policy: StalePolicy,
        #[builder(default)] single_flight: bool,
    ) -> Self {
        Self {
            fetcher,
            ttl,
            fetch_timeout,
            stale_policy,
            refresh_gate: single_flight.then(|| Mutex::new(())),
            entry: RwLock::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Creates a cache fetching over HTTP as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the config is invalid or
    /// [`AuthError::HttpClient`] if the HTTP client cannot be built.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpKeySetFetcher::new(config.jwks_url(), config.fetch_timeout())?;

        Ok(Self::builder()
            .fetcher(Arc::new(fetcher))
            .ttl(config.cache_ttl())
            .fetch_timeout(config.fetch_timeout())
            .stale_policy(config.stale_policy())
            .single_flight(config.single_flight())
            .build())
    }

    /// Returns the current key set, fetching it first if missing or stale.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeySetUnavailable`] if a needed fetch fails (or
    /// times out, or yields an empty set) and the stale policy does not
    /// permit serving the previous entry.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self) -> Result<Arc<PublicKeySet>> {
        if let Some(key_set) = self.fresh() {
            tracing::debug!("key set cache hit");
            return Ok(key_set);
        }

        let Some(gate) = &self.refresh_gate else {
            return self.refresh().await;
        };

        let _permit = gate.lock().await;
        if let Some(key_set) = self.fresh() {
            tracing::debug!("key set refreshed by a concurrent caller");
            return Ok(key_set);
        }
        self.refresh().await
    }

    /// Drops the cached entry so the next [`get`](Self::get) fetches.
    pub fn invalidate(&self) {
        *self.entry.write() = None;
        tracing::info!("key set cache invalidated");
    }

    /// Number of fetch attempts made so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Age of the cached entry, if any.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.entry.read().as_ref().map(|entry| entry.fetched_at.elapsed())
    }

    /// The freshness window.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn fresh(&self) -> Option<Arc<PublicKeySet>> {
        self.entry
            .read()
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() <= self.ttl)
            .map(|entry| Arc::clone(&entry.key_set))
    }

    async fn refresh(&self) -> Result<Arc<PublicKeySet>> {
        fail_point!("key-set-before-fetch", |_| {
            Err(AuthError::key_set_unavailable(FetchError::other(
                "fail point 'key-set-before-fetch' triggered",
            )))
        });

        self.fetches.fetch_add(1, Ordering::Relaxed);

        match self.fetch().await {
            Ok(key_set) => {
                let key_set = Arc::new(key_set);
                let entry =
                    Arc::new(CacheEntry { key_set: Arc::clone(&key_set), fetched_at: Instant::now() });
                *self.entry.write() = Some(entry);

                tracing::info!(keys = key_set.len(), kids = ?key_set.key_ids(), "key set refreshed");
                Ok(key_set)
            },
            Err(err) => self.fall_back(err),
        }
    }

    async fn fetch(&self) -> std::result::Result<PublicKeySet, FetchError> {
        let key_set = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch())
            .await
            .map_err(|_| FetchError::Timeout { timeout: self.fetch_timeout })??;

        if key_set.is_empty() {
            return Err(FetchError::EmptyKeySet);
        }
        Ok(key_set)
    }

    fn fall_back(&self, err: FetchError) -> Result<Arc<PublicKeySet>> {
        let previous = self.entry.read().clone();

        if let StalePolicy::ServeStale { max_staleness } = self.stale_policy
            && let Some(entry) = previous
            && entry.fetched_at.elapsed() <= self.ttl.saturating_add(max_staleness)
        {
            tracing::warn!(
                error = %err,
                fetch_age_secs = entry.fetched_at.elapsed().as_secs(),
                "key set refresh failed, serving stale copy"
            );
            return Ok(Arc::clone(&entry.key_set));
        }

        tracing::error!(error = %err, "key set unavailable");
        Err(AuthError::key_set_unavailable(err))
    }
}

impl fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetCache")
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("stale_policy", &self.stale_policy)
            .field("single_flight", &self.refresh_gate.is_some())
            .field("age", &self.age())
            .field("fetches", &self.fetch_count())
            .finish_non_exhaustive()
    }
}
