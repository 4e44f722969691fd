//! Bounded in-process cache with LRU eviction.

use crate::error::CacheResult;
use crate::traits::{CacheEntry, CacheKey, PasteCache};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Debug)]
struct MemoryEntry {
    entry: CacheEntry,
    expires_at: Instant,
    last_access: Instant,
}

/// Bounded in-process cache.
///
/// Holds at most `max_entries` items, evicting the least-recently-used entry
/// once full. TTL expiry is lazy on access; a periodic background sweep
/// (see [`MemoryCache::spawn_sweeper`]) reclaims entries that are never
/// touched again.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, MemoryEntry>,
    max_entries: usize,
}

impl MemoryCache {
    /// Create a new cache with the given item-count ceiling.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of entries currently held, including not-yet-swept expired
    /// ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Spawn a background task sweeping expired entries at `interval`.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let dropped = cache.sweep_expired();
                if dropped > 0 {
                    tracing::debug!(dropped, "Swept expired cache entries");
                }
            }
        })
    }

    /// Make room for one insertion: drop expired entries first, then the
    /// least-recently-used one.
    fn evict_for_insert(&self) {
        self.sweep_expired();
        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().last_access)
                .map(|e| *e.key());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl PasteCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let now = Instant::now();
        let mut expired = false;
        let result = match self.entries.get_mut(key) {
            Some(mut occupied) => {
                if occupied.expires_at <= now {
                    expired = true;
                    None
                } else {
                    occupied.last_access = now;
                    Some(occupied.entry.clone())
                }
            }
            None => None,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(result)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> CacheResult<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_for_insert();
        }
        let now = Instant::now();
        self.entries.insert(
            *key,
            MemoryEntry {
                entry,
                expires_at: now + ttl,
                last_access: now,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
