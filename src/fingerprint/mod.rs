//! Content fingerprinting: exact and near-duplicate fingerprints over
//! normalized page text.
//!
//! SHA-256 for exact-match fingerprints, SimHash-64 for cheap
//! near-duplicate comparison, and MinHash(128)+LSH banding for
//! similarity search over large corpora. Hashing via `sha2` and
//! `xxhash-rust`, a hand-rolled MinHash/SimHash implementation in place
//! of a permutation-family crate (none fits this combination of
//! algorithms cleanly).

mod lsh;
mod minhash;
mod simhash;

pub use lsh::LshIndex;
pub use minhash::MinHashSignature;
pub use simhash::simhash64;

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct ContentFingerprint {
    pub sha256: String,
    pub xxhash: u64,
    pub simhash: u64,
    pub minhash: MinHashSignature,
    pub byte_length: usize,
    pub word_count: usize,
    pub unique_word_count: usize,
}

/// Normalize free text the way the original fingerprinter does: collapse
/// whitespace, lowercase, and fold volatile tokens (URLs, dates, numbers)
/// to stable placeholders so near-identical pages with only a timestamp or
/// page number differing still fingerprint as duplicates.
#[must_use]
pub fn normalize_content(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut out = String::with_capacity(collapsed.len());
    for token in collapsed.split(' ') {
        if token.starts_with("http://") || token.starts_with("https://") {
            out.push_str("URL");
        } else if is_iso_date(token) {
            out.push_str("DATE");
        } else if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
            out.push_str("NUM");
        } else {
            out.push_str(token);
        }
        out.push(' ');
    }
    out.trim().to_string()
}

fn is_iso_date(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

#[must_use]
pub fn fingerprint(content: &str) -> ContentFingerprint {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let sha256 = hex::encode(hasher.finalize());
    let xxhash = xxh3_64(normalized.as_bytes());
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    let simhash = simhash64(&words);
    let minhash = MinHashSignature::compute(&normalized, 128);
    let unique_word_count = words.iter().collect::<HashSet<_>>().len();

    ContentFingerprint {
        sha256,
        xxhash,
        simhash,
        minhash,
        byte_length: content.len(),
        word_count: words.len(),
        unique_word_count,
    }
}

#[must_use]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Bit-similarity between two SimHash values, 0.0 (no shared bits) to 1.0
/// (identical).
#[must_use]
pub fn simhash_similarity(a: u64, b: u64) -> f64 {
    1.0 - (hamming_distance(a, b) as f64 / 64.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_fingerprints_equal() {
        let a = fingerprint("The quick brown fox jumps over the lazy dog.");
        let b = fingerprint("The quick brown fox jumps over the lazy dog.");
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.simhash, b.simhash);
    }

    #[test]
    fn url_and_number_variance_is_normalized_away() {
        let a = normalize_content("Visit https://example.com/page on 2024-01-01 for item 42");
        let b = normalize_content("Visit https://other.com/x on 2024-06-06 for item 99");
        assert_eq!(a, b);
    }

    #[test]
    fn near_duplicate_simhash_within_small_distance() {
        let a = fingerprint("Breaking news: the market rallied today on strong earnings.");
        let b = fingerprint("Breaking news: the market rallied today on strong earnings reports.");
        assert!(hamming_distance(a.simhash, b.simhash) < 20);
    }

    #[test]
    fn unrelated_content_has_larger_distance() {
        let a = fingerprint("Cats are wonderful independent pets that sleep most of the day.");
        let b = fingerprint("Quarterly revenue growth exceeded analyst expectations this period.");
        assert!(simhash_similarity(a.simhash, b.simhash) < 0.9);
    }

    #[test]
    fn byte_length_tracks_original_content_not_normalized() {
        let content = "Hello   WORLD";
        let fp = fingerprint(content);
        assert_eq!(fp.byte_length, content.len());
    }

    #[test]
    fn unique_word_count_collapses_repeats() {
        let fp = fingerprint("the cat sat on the mat with the cat");
        assert_eq!(fp.word_count, 9);
        assert!(fp.unique_word_count < fp.word_count);
        assert_eq!(fp.unique_word_count, 6);
    }
}
