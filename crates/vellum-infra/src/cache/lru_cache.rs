use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{CacheError, CacheLookup, CacheResult, FillTicket, MediaCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

struct State {
    entries: LruCache<String, CacheEntry>,
    /// Generation of each key's latest invalidation.
    invalidations: LruCache<String, u64>,
    /// Highest generation among invalidation records evicted from `invalidations`.
    evicted_floor: u64,
    generation: u64,
}

impl State {
    fn last_invalidation(&self, key: &str) -> u64 {
        self.invalidations
            .peek(key)
            .copied()
            .unwrap_or(self.evicted_floor)
    }
}

/// Bounded in-process cache with per-entry expiry.
///
/// Invalidation records are kept in their own bounded LRU. When one is evicted its
/// generation raises `evicted_floor`, which then applies to every key without a
/// record; fills may be rejected spuriously but never accepted wrongly.
pub struct LruMediaCache {
    state: Mutex<State>,
}

impl LruMediaCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(State {
                entries: LruCache::new(capacity),
                invalidations: LruCache::new(capacity),
                evicted_floor: 0,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CacheError::Backend("cache state poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MediaCache for LruMediaCache {
    async fn get(&self, key: &str) -> CacheResult<CacheLookup> {
        let mut state = self.lock()?;
        let ticket = FillTicket(state.generation);

        let expired = match state.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                return Ok(CacheLookup {
                    value: Some(entry.value.clone()),
                    ticket,
                });
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.pop(key);
        }

        Ok(CacheLookup {
            value: None,
            ticket,
        })
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        ticket: FillTicket,
    ) -> CacheResult<bool> {
        let mut state = self.lock()?;
        if ticket.0 < state.last_invalidation(key) {
            tracing::debug!(key = %key, ticket = ticket.0, "Discarding stale cache fill");
            return Ok(false);
        }

        state.entries.put(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(true)
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let mut state = self.lock()?;
        state.generation += 1;
        let generation = state.generation;

        state.entries.pop(key);
        if let Some((evicted_key, evicted_generation)) =
            state.invalidations.push(key.to_string(), generation)
        {
            if evicted_key != key {
                state.evicted_floor = state.evicted_floor.max(evicted_generation);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn miss_then_fill_then_hit() {
        let cache = LruMediaCache::new(8);
        let lookup = cache.get("media:1").await.unwrap();
        assert!(lookup.value.is_none());

        assert!(cache
            .set("media:1", b"v1".to_vec(), TTL, lookup.ticket)
            .await
            .unwrap());
        let hit = cache.get("media:1").await.unwrap();
        assert_eq!(hit.value.as_deref(), Some(&b"v1"[..]));
    }

    #[tokio::test]
    async fn fill_after_invalidation_is_rejected() {
        let cache = LruMediaCache::new(8);

        // Reader misses and goes to the store.
        let reader = cache.get("media:1").await.unwrap();
        // Writer commits and invalidates before the reader fills.
        cache.invalidate("media:1").await.unwrap();

        let stored = cache
            .set("media:1", b"stale".to_vec(), TTL, reader.ticket)
            .await
            .unwrap();
        assert!(!stored);
        assert!(cache.get("media:1").await.unwrap().value.is_none());

        // A reader that starts after the invalidation may fill.
        let fresh = cache.get("media:1").await.unwrap();
        assert!(cache
            .set("media:1", b"fresh".to_vec(), TTL, fresh.ticket)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn invalidating_other_keys_does_not_block_fill() {
        let cache = LruMediaCache::new(8);
        let reader = cache.get("media:1").await.unwrap();
        cache.invalidate("media:2").await.unwrap();
        assert!(cache
            .set("media:1", b"v".to_vec(), TTL, reader.ticket)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn evicted_invalidation_still_rejects_stale_fill() {
        let cache = LruMediaCache::new(2);
        let reader = cache.get("media:1").await.unwrap();

        cache.invalidate("media:1").await.unwrap();
        // Push the record for media:1 out of the bounded invalidation log.
        cache.invalidate("media:2").await.unwrap();
        cache.invalidate("media:3").await.unwrap();

        assert!(!cache
            .set("media:1", b"stale".to_vec(), TTL, reader.ticket)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = LruMediaCache::new(8);
        let lookup = cache.get("media:1").await.unwrap();
        cache
            .set("media:1", b"v".to_vec(), Duration::ZERO, lookup.ticket)
            .await
            .unwrap();
        assert!(cache.get("media:1").await.unwrap().value.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = LruMediaCache::new(2);
        for i in 0..5 {
            let key = format!("media:{}", i);
            let lookup = cache.get(&key).await.unwrap();
            cache.set(&key, vec![i], TTL, lookup.ticket).await.unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
