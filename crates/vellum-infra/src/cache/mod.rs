//! Media record cache
//!
//! Cache-aside contract used by the lifecycle services. Readers take a
//! [`FillTicket`] with every lookup and hand it back when filling; a fill whose
//! ticket predates the key's latest invalidation is discarded, so a slow reader
//! can never re-install a value that a writer already invalidated.
//!
//! Callers treat every [`CacheError`] as a miss.

mod guarded;
mod lru_cache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use guarded::GuardedCache;
pub use lru_cache::LruMediaCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Cache generation observed by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FillTicket(pub u64);

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub value: Option<Vec<u8>>,
    pub ticket: FillTicket,
}

#[async_trait]
pub trait MediaCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<CacheLookup>;

    /// Store `value` unless `key` was invalidated after `ticket` was issued.
    /// Returns whether the value was stored.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        ticket: FillTicket,
    ) -> CacheResult<bool>;

    async fn invalidate(&self, key: &str) -> CacheResult<()>;
}
