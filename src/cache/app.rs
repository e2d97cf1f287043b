//! Application cache: single-process, thread-safe, with pluggable
//! eviction policies (LRU, LFU, FIFO, Adaptive). Values are stored as
//! raw bytes so the cache stays generic over callers.

use dashmap::DashMap;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Fifo,
    Adaptive,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    size: usize,
    created_at: f64,
    expires_at: f64,
    access_count: u64,
    last_accessed: f64,
    cost: f64,
    tags: HashSet<String>,
}

/// Min-heap entry ordered by `expires_at` (earliest first); `Reverse` via
/// manual `Ord` flip since `BinaryHeap` is a max-heap by default.
#[derive(Debug, Clone, PartialEq)]
struct ExpiryEntry {
    expires_at: f64,
    key: String,
}

impl Eq for ExpiryEntry {}
impl Ord for ExpiryEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.expires_at.partial_cmp(&self.expires_at).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for ExpiryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
    pub current_bytes: usize,
    pub utilization: f64,
}

pub struct ApplicationCache {
    entries: DashMap<String, CacheEntry>,
    tag_index: DashMap<String, HashSet<String>>,
    expiry_heap: parking_lot::Mutex<BinaryHeap<ExpiryEntry>>,
    max_size_bytes: usize,
    max_entries: usize,
    default_ttl_secs: f64,
    policy: EvictionPolicy,
    current_bytes: AtomicU64,
    stats: CacheStats,
}

impl ApplicationCache {
    #[must_use]
    pub fn new(max_size_bytes: usize, max_entries: usize, default_ttl_secs: f64, policy: EvictionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            expiry_heap: parking_lot::Mutex::new(BinaryHeap::new()),
            max_size_bytes,
            max_entries,
            default_ttl_secs,
            policy,
            current_bytes: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    fn now() -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Self::now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if entry.expires_at <= now {
            drop(entry);
            self.remove_entry(key);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        entry.access_count += 1;
        entry.last_accessed = now;
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    pub fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<f64>, cost: f64, tags: HashSet<String>) -> bool {
        let size = value.len();
        if size > self.max_size_bytes {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        while self.should_evict(size) {
            if !self.evict_one() {
                break;
            }
        }

        let now = Self::now();
        let expires_at = now + ttl_secs.unwrap_or(self.default_ttl_secs);

        if let Some(old) = self.entries.get(key) {
            self.current_bytes.fetch_sub(old.size as u64, Ordering::Relaxed);
        }

        for tag in &tags {
            self.tag_index.entry(tag.clone()).or_default().insert(key.to_string());
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry { value, size, created_at: now, expires_at, access_count: 0, last_accessed: now, cost, tags },
        );
        self.current_bytes.fetch_add(size as u64, Ordering::Relaxed);
        self.expiry_heap.lock().push(ExpiryEntry { expires_at, key: key.to_string() });
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn delete(&self, key: &str) -> bool {
        self.remove_entry(key)
    }

    fn remove_entry(&self, key: &str) -> bool {
        let Some((_, entry)) = self.entries.remove(key) else { return false };
        self.current_bytes.fetch_sub(entry.size as u64, Ordering::Relaxed);
        for tag in &entry.tags {
            if let Some(mut keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
            }
        }
        true
    }

    fn should_evict(&self, incoming_size: usize) -> bool {
        let projected_bytes = self.current_bytes.load(Ordering::Relaxed) as usize + incoming_size;
        projected_bytes > self.max_size_bytes || self.entries.len() >= self.max_entries
    }

    fn evict_one(&self) -> bool {
        let Some(victim) = self.select_victim() else { return false };
        self.remove_entry(&victim);
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn select_victim(&self) -> Option<String> {
        match self.policy {
            EvictionPolicy::Lru => self
                .entries
                .iter()
                .min_by(|a, b| a.value().last_accessed.partial_cmp(&b.value().last_accessed).unwrap())
                .map(|e| e.key().clone()),
            EvictionPolicy::Lfu => self
                .entries
                .iter()
                .min_by_key(|e| e.value().access_count)
                .map(|e| e.key().clone()),
            EvictionPolicy::Fifo => self
                .entries
                .iter()
                .min_by(|a, b| a.value().created_at.partial_cmp(&b.value().created_at).unwrap())
                .map(|e| e.key().clone()),
            EvictionPolicy::Adaptive => {
                let now = Self::now();
                self.entries
                    .iter()
                    .min_by(|a, b| adaptive_score(a.value(), now).partial_cmp(&adaptive_score(b.value(), now)).unwrap())
                    .map(|e| e.key().clone())
            }
        }
    }

    /// Remove all entries carrying `tag`.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let Some((_, keys)) = self.tag_index.remove(tag) else { return 0 };
        let count = keys.len();
        for key in keys {
            self.remove_entry(&key);
        }
        count
    }

    /// Remove all keys matching a glob pattern, scanning the keyspace.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let Ok(glob) = crate::util::glob::compile_glob_pattern(pattern) else { return 0 };
        let victims: Vec<String> =
            self.entries.iter().filter(|e| glob.is_match(e.key())).map(|e| e.key().clone()).collect();
        for key in &victims {
            self.remove_entry(key);
        }
        victims.len()
    }

    /// Pop and discard expired heap entries, ignoring stale pops for keys
    /// already removed by a set/delete since the push.
    pub fn sweep_expired(&self) -> usize {
        let now = Self::now();
        let mut removed = 0;
        let mut heap = self.expiry_heap.lock();
        while let Some(top) = heap.peek() {
            if top.expires_at > now {
                break;
            }
            let top = heap.pop().unwrap();
            if let Some(entry) = self.entries.get(&top.key) {
                if entry.expires_at > now {
                    continue;
                }
            } else {
                continue;
            }
            drop(heap);
            if self.remove_entry(&top.key) {
                removed += 1;
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            }
            heap = self.expiry_heap.lock();
        }
        removed
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let current_bytes = self.current_bytes.load(Ordering::Relaxed) as usize;
        CacheStatsSnapshot {
            hits,
            misses,
            sets: self.stats.sets.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            current_bytes,
            utilization: current_bytes as f64 / self.max_size_bytes as f64,
        }
    }
}

/// Weighted combination of recency, inverse-frequency, and size, per
/// adaptive eviction; lower score evicts first.
fn adaptive_score(entry: &CacheEntry, now: f64) -> f64 {
    let recency = now - entry.last_accessed;
    let inverse_frequency = 1.0 / (entry.access_count as f64 + 1.0);
    let size_weight = entry.size as f64 / (1024.0 * 1024.0);
    recency * 0.4 + inverse_frequency * 100.0 * 0.4 + size_weight * 0.2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set_hits() {
        let cache = ApplicationCache::new(1024 * 1024, 100, 3600.0, EvictionPolicy::Lru);
        cache.set("k1", b"hello".to_vec(), None, 1.0, HashSet::new());
        assert_eq!(cache.get("k1"), Some(b"hello".to_vec()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn oversized_value_is_rejected() {
        let cache = ApplicationCache::new(10, 100, 3600.0, EvictionPolicy::Lru);
        assert!(!cache.set("k1", vec![0u8; 100], None, 1.0, HashSet::new()));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = ApplicationCache::new(1024, 100, -1.0, EvictionPolicy::Lru);
        cache.set("k1", b"x".to_vec(), Some(-1.0), 1.0, HashSet::new());
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn invalidate_tag_removes_tagged_entries() {
        let cache = ApplicationCache::new(1024 * 1024, 100, 3600.0, EvictionPolicy::Lru);
        let mut tags = HashSet::new();
        tags.insert("section-a".to_string());
        cache.set("k1", b"x".to_vec(), None, 1.0, tags.clone());
        cache.set("k2", b"y".to_vec(), None, 1.0, tags);
        assert_eq!(cache.invalidate_tag("section-a"), 2);
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn lfu_evicts_least_frequently_used() {
        let cache = ApplicationCache::new(20, 2, 3600.0, EvictionPolicy::Lfu);
        cache.set("hot", b"12345".to_vec(), None, 1.0, HashSet::new());
        cache.set("cold", b"12345".to_vec(), None, 1.0, HashSet::new());
        cache.get("hot");
        cache.get("hot");
        cache.set("new", b"12345".to_vec(), None, 1.0, HashSet::new());
        assert_eq!(cache.get("cold"), None);
        assert!(cache.get("hot").is_some());
    }
}
