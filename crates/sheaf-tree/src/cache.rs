//! Bounded LRU over resident data chunks.
//!
//! Entries are keyed by pointer slot and remember the node that owned the
//! pointer when it was touched. The manager only tracks order; dropping the
//! decoded chunk and unloading idle ancestors is the container's job, driven
//! by the evictions [`CacheManager::touch`] returns.

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Cache sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Resident entries left after an eviction cycle.
    pub target_capacity: usize,
    /// Resident entries that start an eviction cycle.
    pub trigger_capacity: usize,
    /// Levels below the root that eviction never unloads.
    pub kept_metadata_levels: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            target_capacity: 10,
            trigger_capacity: 15,
            kept_metadata_levels: 2,
        }
    }
}

/// LRU order over slots, with an owner hint per slot.
///
/// The underlying [`LruCache`] is unbounded; eviction happens in batches
/// once the trigger capacity is reached.
#[derive(Debug)]
pub struct CacheManager<O> {
    config: CacheConfig,
    entries: LruCache<u64, O>,
}

impl<O: Copy> CacheManager<O> {
    /// A trigger capacity at or below the target is raised to `target + 1`.
    pub fn new(mut config: CacheConfig) -> Self {
        config.trigger_capacity = config.trigger_capacity.max(config.target_capacity + 1);
        Self {
            config,
            entries: LruCache::unbounded(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, slot: u64) -> bool {
        self.entries.contains(&slot)
    }

    /// Mark `slot` most recently used.
    ///
    /// Returns the entries evicted to bring the cache back to the target
    /// capacity once it reached the trigger capacity.
    pub fn touch(&mut self, slot: u64, owner: O) -> Vec<(u64, O)> {
        self.entries.put(slot, owner);

        let mut evicted = Vec::new();
        if self.entries.len() >= self.config.trigger_capacity {
            while self.entries.len() > self.config.target_capacity {
                match self.entries.pop_lru() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
        }
        evicted
    }

    /// Drop `slot` without evicting anything else.
    pub fn forget(&mut self, slot: u64) {
        self.entries.pop(&slot);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn evicts_down_to_target_at_trigger() {
        let mut cache = CacheManager::new(CacheConfig::default());
        for slot in 0..14 {
            assert!(cache.touch(slot, ()).is_empty());
        }
        let evicted = cache.touch(14, ());
        let slots: Vec<u64> = evicted.iter().map(|(s, _)| *s).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4]);
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn touch_refreshes_recency() {
        let config = CacheConfig {
            target_capacity: 1,
            trigger_capacity: 3,
            kept_metadata_levels: 2,
        };
        let mut cache = CacheManager::new(config);
        cache.touch(1, 'a');
        cache.touch(2, 'b');
        cache.touch(1, 'a');
        let evicted = cache.touch(3, 'c');
        assert_eq!(evicted, vec![(2, 'b'), (1, 'a')]);
        assert!(cache.contains(3));
    }

    #[test]
    fn hot_slot_survives_eviction_cycles() {
        let mut cache = CacheManager::new(CacheConfig::default());
        let mut evicted = Vec::new();
        for slot in 1..100u64 {
            cache.touch(0, ());
            evicted.extend(cache.touch(slot, ()).into_iter().map(|(s, _)| s));
        }
        assert!(cache.contains(0));
        assert!(!evicted.contains(&0));
        assert!(cache.len() < cache.config().trigger_capacity);
    }

    #[test]
    fn forget_does_not_evict() {
        let mut cache = CacheManager::new(CacheConfig::default());
        cache.touch(1, ());
        cache.touch(2, ());
        cache.forget(1);
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(1));
        cache.forget(99);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn trigger_raised_above_target() {
        let cache: CacheManager<()> = CacheManager::new(CacheConfig {
            target_capacity: 4,
            trigger_capacity: 2,
            kept_metadata_levels: 1,
        });
        assert_eq!(cache.config().trigger_capacity, 5);
    }

    proptest! {
        #[test]
        fn resident_entries_stay_bounded(slots in proptest::collection::vec(0u64..40, 0..300)) {
            let config = CacheConfig::default();
            let mut cache = CacheManager::new(config);
            for slot in slots {
                let evicted = cache.touch(slot, ());
                prop_assert!(cache.len() < config.trigger_capacity);
                if !evicted.is_empty() {
                    prop_assert!(cache.len() <= config.target_capacity);
                }
            }
        }
    }
}
