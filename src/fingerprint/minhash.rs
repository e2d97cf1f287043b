//! MinHash signatures over word 3-shingles (`num_perm = 128`).
//!
//! Each "permutation" is a distinctly-seeded `xxh3_64` pass over the same
//! shingle set, standing in for a true universal-hashing permutation
//! family.

use std::collections::HashSet;
use xxhash_rust::xxh3::xxh3_64_with_seed;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    pub values: Vec<u64>,
}

impl MinHashSignature {
    #[must_use]
    pub fn compute(text: &str, num_perm: usize) -> Self {
        let shingles = extract_shingles(text, 3);
        if shingles.is_empty() {
            return Self { values: vec![u64::MAX; num_perm] };
        }

        let mut values = vec![u64::MAX; num_perm];
        for shingle in &shingles {
            let bytes = shingle.as_bytes();
            for (seed, slot) in values.iter_mut().enumerate() {
                let h = xxh3_64_with_seed(bytes, seed as u64);
                if h < *slot {
                    *slot = h;
                }
            }
        }
        Self { values }
    }

    /// Estimated Jaccard similarity: fraction of permutation slots that
    /// agree between the two signatures.
    #[must_use]
    pub fn estimate_similarity(&self, other: &Self) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }
}

fn extract_shingles(text: &str, k: usize) -> HashSet<String> {
    let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    let mut shingles = HashSet::new();
    if words.len() < k {
        if !words.is_empty() {
            shingles.insert(words.join(" "));
        }
        return shingles;
    }
    for window in words.windows(k) {
        shingles.insert(window.join(" "));
    }
    shingles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_similarity_one() {
        let a = MinHashSignature::compute("the quick brown fox jumps over the lazy dog", 32);
        let b = MinHashSignature::compute("the quick brown fox jumps over the lazy dog", 32);
        assert!((a.estimate_similarity(&b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mostly_overlapping_text_has_high_similarity() {
        let a = MinHashSignature::compute(
            "the quick brown fox jumps over the lazy dog today",
            64,
        );
        let b = MinHashSignature::compute(
            "the quick brown fox jumps over the lazy dog yesterday",
            64,
        );
        assert!(a.estimate_similarity(&b) > 0.5);
    }

    #[test]
    fn unrelated_text_has_low_similarity() {
        let a = MinHashSignature::compute("quantum mechanics describes subatomic particles", 64);
        let b = MinHashSignature::compute("the recipe calls for two cups of flour", 64);
        assert!(a.estimate_similarity(&b) < 0.3);
    }
}
