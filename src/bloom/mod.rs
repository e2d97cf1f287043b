//! Bloom deduper — a fixed-capacity probabilistic URL seen-set, with the
//! same capacity/error-rate/item-count bookkeeping and "warn but don't
//! rebuild" policy at 90% fill as the reference implementation, backed
//! by a lock-free-friendly Rust bit-set with snapshot-replace
//! persistence.
//!
//! Contract: `seen?` may false-positive with probability bounded by
//! `epsilon`, but `add` never produces a false negative — `seen?` after
//! `add` is always true.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// On-disk / in-memory snapshot of bloom state, written atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    capacity: u64,
    epsilon: f64,
    count: u64,
    bits: u64,
    hash_fns: u32,
    bitset: Vec<u64>,
}

/// Probabilistic seen-set over normalized URLs.
///
/// Internals are guarded by a single `RwLock<Vec<u64>>` bit-set: concurrent
/// `seen?` readers take a read lock against the current snapshot; `add`
/// takes a write lock to flip bits. `persist`/`load` atomically swap the
/// whole bit-set rather than mutating it incrementally on disk.
pub struct BloomDeduper {
    capacity: u64,
    epsilon: f64,
    bits: u64,
    hash_fns: u32,
    bitset: RwLock<Vec<u64>>,
    count: AtomicUsize,
}

impl BloomDeduper {
    /// Create a new deduper sized for `capacity` items at false-positive
    /// rate `epsilon` (e.g. `0.001` for 0.1%).
    #[must_use]
    pub fn new(capacity: u64, epsilon: f64) -> Self {
        let bits = optimal_bits(capacity, epsilon).max(64);
        let hash_fns = optimal_hash_fns(bits, capacity).max(1);
        let words = bits.div_ceil(64) as usize;
        Self {
            capacity,
            epsilon,
            bits,
            hash_fns,
            bitset: RwLock::new(vec![0u64; words]),
            count: AtomicUsize::new(0),
        }
    }

    /// Probabilistically test membership. May return `true` for a URL never
    /// added, with probability bounded by `epsilon`; never returns `false`
    /// for a URL that was `add`-ed.
    #[must_use]
    pub fn seen(&self, url: &str) -> bool {
        let bitset = self.bitset.read();
        self.indices(url)
            .all(|idx| bitset[(idx / 64) as usize] & (1 << (idx % 64)) != 0)
    }

    /// Insert `url`. Returns `true` if this insertion newly set at least one
    /// bit (i.e. the URL was not already `seen?`), `false` if it was already
    /// present (a redundant add).
    pub fn add(&self, url: &str) -> bool {
        let newly_inserted = !self.seen(url);
        let mut bitset = self.bitset.write();
        for idx in self.indices(url) {
            bitset[(idx / 64) as usize] |= 1 << (idx % 64);
        }
        drop(bitset);

        if newly_inserted {
            let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
            if count as u64 > (self.capacity * 9) / 10 {
                warn!(
                    count,
                    capacity = self.capacity,
                    "bloom deduper approaching capacity; caller should rebuild"
                );
            }
        }
        newly_inserted
    }

    /// Current fill ratio `count / capacity`, used by callers to decide
    /// whether to rebuild; rebuild policy is left to the caller.
    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.count.load(Ordering::Relaxed) as f64 / self.capacity as f64
    }

    #[must_use]
    pub fn stats(&self) -> BloomStats {
        BloomStats {
            capacity: self.capacity,
            count: self.count.load(Ordering::Relaxed) as u64,
            epsilon: self.epsilon,
            fill_ratio: self.fill_ratio(),
            estimated_memory_bytes: self.bits / 8,
        }
    }

    /// Atomically persist the bloom state to `path`: serialize to a temp
    /// file in the same directory, then rename over the target. Readers of
    /// `path` therefore always observe either the prior snapshot or the new
    /// one, never a partial write.
    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let snapshot = Snapshot {
            capacity: self.capacity,
            epsilon: self.epsilon,
            count: self.count.load(Ordering::Relaxed) as u64,
            bits: self.bits,
            hash_fns: self.hash_fns,
            bitset: self.bitset.read().clone(),
        };
        let bytes = bincode::serialize(&snapshot)?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load a previously persisted snapshot, replacing this deduper's state.
    pub fn load(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)?;
        if snapshot.bits != self.bits || snapshot.hash_fns != self.hash_fns {
            anyhow::bail!("snapshot shape does not match this deduper's configuration");
        }
        *self.bitset.write() = snapshot.bitset;
        self.count.store(snapshot.count as usize, Ordering::Relaxed);
        Ok(())
    }

    /// Derive `hash_fns` independent bit indices from SHA-256(url) using
    /// the Kirsch–Mitzenmacher double-hashing technique: `h_i = (h1 + i*h2)
    /// mod bits`, where `h1`/`h2` are two independent 64-bit halves of the
    /// digest. This is the "k independent hash functions over SHA-256"
    /// required for an independent-hash-function bloom filter.
    fn indices(&self, url: &str) -> impl Iterator<Item = u64> + '_ {
        let digest = Sha256::digest(url.as_bytes());
        let h1 = u64::from_le_bytes(digest[0..8].try_into().unwrap_or_default());
        let h2 = u64::from_le_bytes(digest[8..16].try_into().unwrap_or_default()) | 1;
        (0..self.hash_fns as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.bits)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BloomStats {
    pub capacity: u64,
    pub count: u64,
    pub epsilon: f64,
    pub fill_ratio: f64,
    pub estimated_memory_bytes: u64,
}

/// Optimal bit-array size `m = ceil(-n ln(p) / (ln 2)^2)`.
fn optimal_bits(capacity: u64, epsilon: f64) -> u64 {
    let n = capacity as f64;
    let m = -(n * epsilon.ln()) / std::f64::consts::LN_2.powi(2);
    m.ceil() as u64
}

/// Optimal hash-function count `k = round(m/n * ln 2)`.
fn optimal_hash_fns(bits: u64, capacity: u64) -> u32 {
    if capacity == 0 {
        return 1;
    }
    ((bits as f64 / capacity as f64) * std::f64::consts::LN_2).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_seen_is_always_true() {
        let bloom = BloomDeduper::new(10_000, 0.01);
        assert!(bloom.add("https://example.com/a"));
        assert!(bloom.seen("https://example.com/a"));
    }

    #[test]
    fn redundant_add_reports_false() {
        let bloom = BloomDeduper::new(10_000, 0.01);
        assert!(bloom.add("https://example.com/a"));
        assert!(!bloom.add("https://example.com/a"));
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let capacity = 50_000u64;
        let epsilon = 0.01;
        let bloom = BloomDeduper::new(capacity, epsilon);
        for i in 0..capacity {
            bloom.add(&format!("https://example.com/seed/{i}"));
        }

        let trials = 20_000;
        let mut false_positives = 0u64;
        for i in 0..trials {
            if bloom.seen(&format!("https://example.com/unseen/{i}")) {
                false_positives += 1;
            }
        }
        let observed_rate = false_positives as f64 / trials as f64;
        // generous slack on the observed false-positive rate vs. epsilon
        assert!(
            observed_rate <= epsilon * 4.0,
            "observed {observed_rate} too far above epsilon {epsilon}"
        );
    }

    #[test]
    fn persist_and_load_round_trip() {
        let bloom = BloomDeduper::new(1_000, 0.01);
        bloom.add("https://example.com/a");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bloom.snapshot");
        bloom.persist(&path).unwrap();

        let restored = BloomDeduper::new(1_000, 0.01);
        restored.load(&path).unwrap();
        assert!(restored.seen("https://example.com/a"));
        assert!(!restored.seen("https://example.com/never-added"));
    }

    #[test]
    fn fill_ratio_tracks_count() {
        let bloom = BloomDeduper::new(100, 0.01);
        for i in 0..50 {
            bloom.add(&format!("u{i}"));
        }
        assert!((bloom.fill_ratio() - 0.5).abs() < 0.01);
    }
}
