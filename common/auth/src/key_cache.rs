use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::AuthResult;
use crate::jwks::{KeySet, KeySetProvider};

const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

struct CachedEntry {
    domain: String,
    fetched_at: Instant,
    keys: KeySet,
}

/// Opt-in TTL cache in front of another provider.
///
/// A cached set is served for at most `ttl`. Forced refreshes (unknown `kid`)
/// go upstream unless the cached set is younger than `min_refresh_interval`.
pub struct CachedKeySetProvider<P> {
    inner: P,
    ttl: Duration,
    min_refresh_interval: Duration,
    entry: RwLock<Option<CachedEntry>>,
}

impl<P: KeySetProvider> CachedKeySetProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL.min(ttl),
            entry: RwLock::new(None),
        }
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    fn cached(&self, domain: &str, max_age: Duration) -> Option<KeySet> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|entry| entry.domain == domain && entry.fetched_at.elapsed() < max_age)
            .map(|entry| entry.keys.clone())
    }

    async fn fetch_and_store(&self, domain: &str) -> AuthResult<KeySet> {
        let keys = self.inner.fetch_key_set(domain).await?;
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(CachedEntry {
            domain: domain.to_string(),
            fetched_at: Instant::now(),
            keys: keys.clone(),
        });
        Ok(keys)
    }
}

#[async_trait]
impl<P: KeySetProvider> KeySetProvider for CachedKeySetProvider<P> {
    async fn fetch_key_set(&self, domain: &str) -> AuthResult<KeySet> {
        if let Some(keys) = self.cached(domain, self.ttl) {
            return Ok(keys);
        }
        self.fetch_and_store(domain).await
    }

    async fn refresh_key_set(&self, domain: &str) -> AuthResult<KeySet> {
        if let Some(keys) = self.cached(domain, self.min_refresh_interval) {
            debug!(domain, "skipping JWKS refresh, cached set is recent");
            return Ok(keys);
        }
        self.fetch_and_store(domain).await
    }

    fn is_cached(&self) -> bool {
        true
    }
}
