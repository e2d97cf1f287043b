//! Dedup engine: applies a `DedupPolicy` over `ContentFingerprint`s
//! produced by the fingerprinter to classify incoming pages as exact,
//! near, canonical, or merely similar duplicates.
//!
//! Checks run in order: exact-hash lookup, then LSH-backed near-duplicate
//! search, then canonical-URL resolution, then a softer similarity pass,
//! defaulting to unique. Thresholds (0.95/0.80/0.60) match the reference
//! duplication-policy defaults.

use crate::fingerprint::{self, simhash_similarity, ContentFingerprint, LshIndex};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("empty content cannot be fingerprinted")]
    EmptyContent,
}

#[derive(Debug, Clone)]
pub struct DedupPolicy {
    pub exact_match_threshold: f64,
    pub near_duplicate_threshold: f64,
    pub similar_content_threshold: f64,
    pub reject_exact_duplicates: bool,
    pub reject_near_duplicates: bool,
    pub merge_similar_content: bool,
    pub prefer_canonical: bool,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            exact_match_threshold: 0.95,
            near_duplicate_threshold: 0.80,
            similar_content_threshold: 0.60,
            reject_exact_duplicates: true,
            reject_near_duplicates: true,
            merge_similar_content: false,
            prefer_canonical: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateVerdict {
    Exact { original_url: String },
    NearDuplicate { original_url: String, similarity: f64 },
    CanonicalDuplicate { canonical_url: String },
    Similar { similar_url: String, similarity: f64 },
    Unique,
}

impl DuplicateVerdict {
    /// Whether the caller should drop this content per policy — a
    /// reject/accept/merge decision collapsed to a boolean plus the
    /// verdict for callers that want the nuance.
    #[must_use]
    pub fn should_reject(&self, policy: &DedupPolicy) -> bool {
        match self {
            DuplicateVerdict::Exact { .. } => policy.reject_exact_duplicates,
            DuplicateVerdict::NearDuplicate { .. } => policy.reject_near_duplicates,
            DuplicateVerdict::CanonicalDuplicate { .. } => policy.prefer_canonical,
            DuplicateVerdict::Similar { .. } | DuplicateVerdict::Unique => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DedupStats {
    pub total_checked: AtomicU64,
    pub exact_duplicates: AtomicU64,
    pub near_duplicates: AtomicU64,
    pub similar_content: AtomicU64,
    pub canonical_redirects: AtomicU64,
    pub unique_content: AtomicU64,
}

pub struct DedupEngine {
    policy: DedupPolicy,
    content_hashes: DashMap<String, String>,
    url_canonical_map: DashMap<String, String>,
    signatures: DashMap<String, fingerprint::MinHashSignature>,
    simhashes: DashMap<String, u64>,
    lsh: RwLock<LshIndex>,
    /// canonical url -> duplicate urls observed for it.
    clusters: DashMap<String, Vec<String>>,
    stats: DedupStats,
}

impl DedupEngine {
    #[must_use]
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            content_hashes: DashMap::new(),
            url_canonical_map: DashMap::new(),
            signatures: DashMap::new(),
            simhashes: DashMap::new(),
            lsh: RwLock::new(LshIndex::new(32, 4)),
            clusters: DashMap::new(),
            stats: DedupStats::default(),
        }
    }

    pub fn check(
        &self,
        content: &str,
        url: &str,
        canonical_url: Option<&str>,
    ) -> Result<DuplicateVerdict, DedupError> {
        if content.trim().is_empty() {
            return Err(DedupError::EmptyContent);
        }
        self.stats.total_checked.fetch_add(1, Ordering::Relaxed);

        let fp = fingerprint::fingerprint(content);

        if let Some(existing) = self.content_hashes.get(&fp.sha256) {
            self.stats.exact_duplicates.fetch_add(1, Ordering::Relaxed);
            return Ok(DuplicateVerdict::Exact { original_url: existing.clone() });
        }

        if let Some(canonical) = canonical_url {
            if canonical != url && self.policy.prefer_canonical {
                if self.content_hashes.iter().any(|e| e.value() == canonical) {
                    self.clusters.entry(canonical.to_string()).or_default().push(url.to_string());
                    self.stats.canonical_redirects.fetch_add(1, Ordering::Relaxed);
                    return Ok(DuplicateVerdict::CanonicalDuplicate {
                        canonical_url: canonical.to_string(),
                    });
                }
                self.url_canonical_map.insert(url.to_string(), canonical.to_string());
            }
        }

        if let Some((best_url, similarity)) = self.best_near_match(url, &fp) {
            if similarity >= self.policy.near_duplicate_threshold {
                self.stats.near_duplicates.fetch_add(1, Ordering::Relaxed);
                self.clusters.entry(best_url.clone()).or_default().push(url.to_string());
                return Ok(DuplicateVerdict::NearDuplicate {
                    original_url: best_url,
                    similarity,
                });
            }
            if similarity >= self.policy.similar_content_threshold {
                self.stats.similar_content.fetch_add(1, Ordering::Relaxed);
                self.store(url, &fp);
                return Ok(DuplicateVerdict::Similar { similar_url: best_url, similarity });
            }
        }

        self.stats.unique_content.fetch_add(1, Ordering::Relaxed);
        self.store(url, &fp);
        Ok(DuplicateVerdict::Unique)
    }

    fn store(&self, url: &str, fp: &ContentFingerprint) {
        self.content_hashes.insert(fp.sha256.clone(), url.to_string());
        self.signatures.insert(url.to_string(), fp.minhash.clone());
        self.simhashes.insert(url.to_string(), fp.simhash);
        self.lsh.write().insert(url.to_string(), &fp.minhash);
    }

    /// Weighted similarity combining a MinHash Jaccard estimate and
    /// SimHash bit-similarity into a single weighted average.
    fn best_near_match(&self, query_url: &str, fp: &ContentFingerprint) -> Option<(String, f64)> {
        let candidates = self.lsh.read().query(&fp.minhash);
        candidates
            .into_iter()
            .filter(|key| key != query_url)
            .filter_map(|key| {
                let sig = self.signatures.get(&key)?;
                let minhash_sim = fp.minhash.estimate_similarity(&sig);
                let simhash_sim = self
                    .simhashes
                    .get(&key)
                    .map(|h| simhash_similarity(fp.simhash, *h))
                    .unwrap_or(0.0);
                let weighted = minhash_sim * 0.6 + simhash_sim * 0.4;
                Some((key, weighted))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    #[must_use]
    pub fn cluster_for(&self, canonical_url: &str) -> Vec<String> {
        self.clusters.get(canonical_url).map(|v| v.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn stats(&self) -> DedupStatsSnapshot {
        DedupStatsSnapshot {
            total_checked: self.stats.total_checked.load(Ordering::Relaxed),
            exact_duplicates: self.stats.exact_duplicates.load(Ordering::Relaxed),
            near_duplicates: self.stats.near_duplicates.load(Ordering::Relaxed),
            similar_content: self.stats.similar_content.load(Ordering::Relaxed),
            canonical_redirects: self.stats.canonical_redirects.load(Ordering::Relaxed),
            unique_content: self.stats.unique_content.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DedupStatsSnapshot {
    pub total_checked: u64,
    pub exact_duplicates: u64,
    pub near_duplicates: u64,
    pub similar_content: u64,
    pub canonical_redirects: u64,
    pub unique_content: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_is_exact_duplicate_on_second_check() {
        let engine = DedupEngine::new(DedupPolicy::default());
        let content = "The quick brown fox jumps over the lazy dog repeatedly.";
        assert_eq!(engine.check(content, "https://a.com/1", None).unwrap(), DuplicateVerdict::Unique);
        let verdict = engine.check(content, "https://a.com/2", None).unwrap();
        assert!(matches!(verdict, DuplicateVerdict::Exact { .. }));
    }

    #[test]
    fn empty_content_is_rejected_with_error() {
        let engine = DedupEngine::new(DedupPolicy::default());
        assert!(engine.check("   ", "https://a.com/1", None).is_err());
    }

    #[test]
    fn canonical_duplicate_detected_once_target_seen() {
        let engine = DedupEngine::new(DedupPolicy::default());
        engine.check("Article body one.", "https://a.com/canonical", None).unwrap();
        let verdict = engine
            .check("Different teaser text.", "https://a.com/?ref=1", Some("https://a.com/canonical"))
            .unwrap();
        assert_eq!(
            verdict,
            DuplicateVerdict::CanonicalDuplicate { canonical_url: "https://a.com/canonical".to_string() }
        );
    }

    #[test]
    fn unrelated_pages_are_both_unique() {
        let engine = DedupEngine::new(DedupPolicy::default());
        let a = engine.check("Cats are wonderful independent pets.", "https://a.com/1", None).unwrap();
        let b = engine
            .check("Quarterly revenue exceeded analyst expectations.", "https://a.com/2", None)
            .unwrap();
        assert_eq!(a, DuplicateVerdict::Unique);
        assert_eq!(b, DuplicateVerdict::Unique);
    }
}
