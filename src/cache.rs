//! Active-rule cache.
//!
//! A small thread-safe holder for a tenant's active-rule list. Invalidation
//! is event-driven (every rule mutation clears it); a TTL can be layered on
//! top but is off by default. The cache is a pure accelerator: correctness
//! never depends on it, and callers always receive their own copy of the
//! list.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::store::Rule;

/// Cache behavior knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheConfig {
    /// Time-to-live for the cached list. `None` means entries live until
    /// explicitly invalidated.
    pub ttl: Option<Duration>,
}

#[derive(Debug)]
struct CacheSlot {
    rules: Option<Vec<Rule>>,
    cached_at: Instant,
}

/// Thread-safe snapshot of a tenant's active-rule list.
#[derive(Debug)]
pub struct ActiveRuleCache {
    slot: RwLock<CacheSlot>,
    ttl: Option<Duration>,
}

impl ActiveRuleCache {
    pub fn new(config: CacheConfig) -> Self {
        ActiveRuleCache {
            slot: RwLock::new(CacheSlot {
                rules: None,
                cached_at: Instant::now(),
            }),
            ttl: config.ttl,
        }
    }

    /// Return a copy of the cached list, or `None` on miss or expiry.
    pub fn get(&self) -> Option<Vec<Rule>> {
        let slot = self.slot.read();
        let rules = slot.rules.as_ref()?;
        if self.expired(slot.cached_at) {
            return None;
        }
        Some(rules.clone())
    }

    /// Store a copy of the list and mark the cache valid.
    pub fn set(&self, rules: Vec<Rule>) {
        let mut slot = self.slot.write();
        slot.rules = Some(rules);
        slot.cached_at = Instant::now();
    }

    /// Drop the cached list; the next `get` misses.
    pub fn invalidate(&self) {
        self.slot.write().rules = None;
    }

    /// Whether a `get` would currently hit, without copying the data.
    pub fn is_valid(&self) -> bool {
        let slot = self.slot.read();
        slot.rules.is_some() && !self.expired(slot.cached_at)
    }

    fn expired(&self, cached_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| cached_at.elapsed() > ttl)
    }
}

impl Default for ActiveRuleCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
