use std::fs;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use tracing::debug;

use super::ParentSetKey;
use crate::config::CachePolicy;

const FALLBACK_MEMORY_BYTES: u64 = 1 << 30;

/// Bounded concurrent map from parent-set keys to local scores.
///
/// Each shard is an independent LRU behind its own lock, so eviction is only
/// approximately global LRU. Writes are single-key and idempotent.
pub struct ScoreCache {
    shards: Vec<Mutex<LruCache<ParentSetKey, f64>>>,
    capacity: usize,
}

impl ScoreCache {
    /// Creates a cache holding about `capacity` entries over `shards` shards.
    pub fn new(shards: usize, capacity: usize) -> Self {
        let shard_count = shards.max(1).min(capacity.max(1));
        let per_shard_cap =
            NonZeroUsize::new((capacity / shard_count).max(1)).unwrap_or(NonZeroUsize::MIN);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(per_shard_cap)))
            .collect();
        Self {
            shards,
            capacity: per_shard_cap.get() * shard_count,
        }
    }

    /// Returns the cached score, refreshing its recency.
    pub fn get(&self, key: &ParentSetKey) -> Option<f64> {
        self.shard_for(key).lock().get(key).copied()
    }

    /// Stores a score, evicting the shard's least recently used entry if full.
    pub fn insert(&self, key: ParentSetKey, score: f64) {
        self.shard_for(&key).lock().put(key, score);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    fn shard_for(&self, key: &ParentSetKey) -> &Mutex<LruCache<ParentSetKey, f64>> {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }
}

/// Number of (variable, parent subset) pairs with at most `max_parents`
/// parents, saturating at `u128::MAX`.
pub fn parent_set_count(num_vars: usize, max_parents: usize) -> u128 {
    if num_vars == 0 {
        return 0;
    }
    let others = (num_vars - 1) as u128;
    let mut binomial: u128 = 1;
    let mut total: u128 = 1;
    for j in 1..=max_parents.min(num_vars - 1) as u128 {
        binomial = binomial.saturating_mul(others - j + 1) / j;
        total = total.saturating_add(binomial);
    }
    total.saturating_mul(num_vars as u128)
}

/// Cache size: a fraction of all possible entries, capped by what fits in a
/// share of available memory.
pub fn cache_capacity(num_vars: usize, max_parents: usize, policy: &CachePolicy) -> usize {
    let total = parent_set_count(num_vars, max_parents);
    let by_fraction = (total as f64 * policy.target_fraction) as u128;
    let memory = policy.memory_budget.unwrap_or_else(available_memory);
    let by_memory =
        u128::from(memory / policy.memory_divisor.max(1) / policy.bytes_per_entry.max(1));
    let chosen = by_fraction.min(by_memory).max(1);
    let capacity = usize::try_from(chosen).unwrap_or(usize::MAX);
    debug!(
        variables = num_vars,
        max_parents,
        possible = %total,
        memory_bytes = memory,
        capacity,
        "score.cache.sized"
    );
    capacity
}

fn available_memory() -> u64 {
    fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|text| {
            text.lines()
                .find(|line| line.starts_with("MemAvailable:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
        })
        .map(|kb| kb * 1024)
        .unwrap_or(FALLBACK_MEMORY_BYTES)
}
