use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{CacheError, CacheLookup, CacheResult, FillTicket, MediaCache};

/// Wraps a [`MediaCache`] so that every call is bounded by a timeout and every
/// failure degrades to a logged miss. An unavailable cache never fails or
/// stalls a request.
#[derive(Clone)]
pub struct GuardedCache {
    inner: Arc<dyn MediaCache>,
    op_timeout: Duration,
}

impl GuardedCache {
    pub fn new(inner: Arc<dyn MediaCache>, op_timeout: Duration) -> Self {
        Self { inner, op_timeout }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }

    /// Returns `None` when the cache could not be consulted; callers must then
    /// skip the fill.
    pub async fn lookup(&self, key: &str) -> Option<CacheLookup> {
        match self.bounded(self.inner.get(key)).await {
            Ok(lookup) => Some(lookup),
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache lookup failed, reading through");
                None
            }
        }
    }

    pub async fn fill(&self, key: &str, value: Vec<u8>, ttl: Duration, ticket: FillTicket) {
        match self.bounded(self.inner.set(key, value, ttl, ticket)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(key = %key, "Cache fill rejected after concurrent invalidation");
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache fill failed");
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.bounded(self.inner.invalidate(key)).await {
            tracing::warn!(error = %e, key = %key, "Cache invalidation failed");
        }
    }
}
