//! Sharded, bounded, time-expiring cache.
//!
//! Each shard is an independent `RwLock<HashMap>`; a lookup touches exactly
//! one shard and holds its lock only for the map operation itself. No
//! callback or outward call ever runs under a shard lock.

use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry<V> {
    value: V,
    inserted: Instant,
    /// Insertion order, for oldest-first eviction
    seq: u64,
}

/// Concurrent cache with per-entry expiry and a total capacity bound.
pub struct ShardedCache<K, V> {
    shards: Vec<RwLock<HashMap<K, Entry<V>>>>,
    hasher: RandomState,
    ttl: Duration,
    shard_capacity: usize,
    next_seq: AtomicU64,
}

impl<K: Hash + Eq + Clone, V: Clone> ShardedCache<K, V> {
    /// Create a cache holding at most roughly `capacity` entries, spread over
    /// `shards` shards, each entry living for `ttl`.
    pub fn new(capacity: usize, shards: usize, ttl: Duration) -> Self {
        let shards = shards.max(1);
        let shard_capacity = capacity.div_ceil(shards).max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
            ttl,
            shard_capacity,
            next_seq: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, Entry<V>>> {
        let idx = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let shard = self.shard(key).read();
        shard
            .get(key)
            .filter(|e| e.inserted.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Insert or replace `key`. Expired entries in the shard are purged when
    /// it is full; if it is still full the oldest entry is evicted.
    pub fn insert(&self, key: K, value: V) {
        let mut shard = self.shard(&key).write();
        if shard.len() >= self.shard_capacity && !shard.contains_key(&key) {
            let ttl = self.ttl;
            shard.retain(|_, e| e.inserted.elapsed() < ttl);
            if shard.len() >= self.shard_capacity {
                let oldest = shard
                    .iter()
                    .min_by_key(|(_, e)| e.seq)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = oldest {
                    shard.remove(&victim);
                }
            }
        }
        shard.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Number of entries, including ones that expired but are not yet purged.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }
}
