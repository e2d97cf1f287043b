//! MinHash LSH banding index: insert/query/remove over banded MinHash
//! signatures. Banding splits each `num_perm`-length signature into
//! `bands` groups of `rows` values; two items are candidate
//! near-duplicates if any band's hash matches, which approximates the
//! similarity threshold from the number of bands/rows chosen.

use super::minhash::MinHashSignature;
use std::collections::{HashMap, HashSet};
use xxhash_rust::xxh3::xxh3_64;

pub struct LshIndex {
    bands: usize,
    rows: usize,
    /// One bucket map per band: band-hash -> keys sharing that band.
    buckets: Vec<HashMap<u64, Vec<String>>>,
    /// Per-key band hashes, so `remove` doesn't need a full rescan.
    key_bands: HashMap<String, Vec<u64>>,
}

impl LshIndex {
    /// `num_perm` must equal `bands * rows`; the `threshold` used elsewhere
    /// in the pipeline to decide "near duplicate" guides the choice of
    /// bands/rows (more bands, fewer rows → lower effective threshold).
    #[must_use]
    pub fn new(bands: usize, rows: usize) -> Self {
        Self {
            bands,
            rows,
            buckets: (0..bands).map(|_| HashMap::new()).collect(),
            key_bands: HashMap::new(),
        }
    }

    fn band_hashes(&self, sig: &MinHashSignature) -> Vec<u64> {
        sig.values
            .chunks(self.rows)
            .take(self.bands)
            .map(|chunk| {
                let bytes: Vec<u8> = chunk.iter().flat_map(|v| v.to_le_bytes()).collect();
                xxh3_64(&bytes)
            })
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, sig: &MinHashSignature) {
        let key = key.into();
        let hashes = self.band_hashes(sig);
        for (band, hash) in hashes.iter().enumerate() {
            self.buckets[band].entry(*hash).or_default().push(key.clone());
        }
        self.key_bands.insert(key, hashes);
    }

    /// Candidate keys sharing at least one band with `sig` (approximate
    /// near-duplicate set; caller should verify with exact similarity).
    #[must_use]
    pub fn query(&self, sig: &MinHashSignature) -> HashSet<String> {
        let mut out = HashSet::new();
        for (band, hash) in self.band_hashes(sig).iter().enumerate() {
            if let Some(keys) = self.buckets[band].get(hash) {
                out.extend(keys.iter().cloned());
            }
        }
        out
    }

    pub fn remove(&mut self, key: &str) {
        let Some(hashes) = self.key_bands.remove(key) else { return };
        for (band, hash) in hashes.iter().enumerate() {
            if let Some(keys) = self.buckets[band].get_mut(hash) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.buckets[band].remove(hash);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.key_bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_item_is_found_by_its_own_signature() {
        let sig = MinHashSignature::compute("the quick brown fox jumps over the lazy dog", 32);
        let mut index = LshIndex::new(8, 4);
        index.insert("doc-1", &sig);
        let matches = index.query(&sig);
        assert!(matches.contains("doc-1"));
    }

    #[test]
    fn removed_item_no_longer_matches() {
        let sig = MinHashSignature::compute("the quick brown fox jumps over the lazy dog", 32);
        let mut index = LshIndex::new(8, 4);
        index.insert("doc-1", &sig);
        index.remove("doc-1");
        assert!(index.is_empty());
        assert!(!index.query(&sig).contains("doc-1"));
    }

    #[test]
    fn dissimilar_signatures_rarely_share_a_band() {
        let sig_a = MinHashSignature::compute("quantum mechanics describes subatomic particles", 32);
        let sig_b = MinHashSignature::compute("the recipe calls for two cups of flour and sugar", 32);
        let mut index = LshIndex::new(8, 4);
        index.insert("doc-a", &sig_a);
        let matches = index.query(&sig_b);
        assert!(!matches.contains("doc-a"));
    }
}
