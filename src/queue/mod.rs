//! Priority URL queue — five-tier, leased, crash-recoverable.
//!
//! State lives entirely in the shared `DistributedStore` as sorted sets,
//! one per tier plus a `processing` set scored by lease expiry and a
//! `visited` set for exact dedup. The in-process `BloomDeduper` is
//! consulted first as a cheap pre-filter before the authoritative
//! `SADD`-based visited check.

mod entry;

pub use entry::{Priority, QueueEntry};

use crate::bloom::BloomDeduper;
use crate::governor::{GovernorError, RateLimitDecision, TokenBucketGovernor};
use crate::store::{DistributedStore, StoreError};
use crate::util::normalize_url;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("url depth {depth} exceeds configured max depth {max_depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Governor(#[from] GovernorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    AlreadySeen,
}

/// Lease reclamation window: entries leased longer than this are returned
/// to their original tier by the recovery loop.
pub const LEASE_TTL: Duration = Duration::from_secs(5 * 60);
/// Retry-delay applied when the Rate Governor denies a leased candidate.
const DEFER_DELAY: Duration = Duration::from_secs(5 * 60);
const MAX_RETRIES: u32 = 5;

pub struct PriorityQueue {
    store: DistributedStore,
    bloom: Arc<BloomDeduper>,
    governor: Arc<TokenBucketGovernor>,
    namespace: String,
    max_depth: u32,
}

impl PriorityQueue {
    #[must_use]
    pub fn new(
        store: DistributedStore,
        bloom: Arc<BloomDeduper>,
        governor: Arc<TokenBucketGovernor>,
        namespace: impl Into<String>,
        max_depth: u32,
    ) -> Self {
        Self {
            store,
            bloom,
            governor,
            namespace: namespace.into(),
            max_depth,
        }
    }

    fn tier_key(&self, priority: Priority) -> String {
        format!("{}:queue:{}", self.namespace, priority.as_str())
    }

    fn processing_key(&self) -> String {
        format!("{}:queue:processing", self.namespace)
    }

    /// Side-stored full entry for a given lease, keyed by `lease_id`. The
    /// `processing` sorted set holds only the lease id (scored by lease
    /// expiry); this key holds the payload `reclaim_expired_leases` needs
    /// to requeue it.
    fn processing_entry_key(&self, lease_id: &str) -> String {
        format!("{}:queue:processing:entry:{lease_id}", self.namespace)
    }

    fn failed_key(&self) -> String {
        format!("{}:queue:failed", self.namespace)
    }

    fn visited_key(&self) -> String {
        format!("{}:queue:visited", self.namespace)
    }

    fn now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    /// `enqueue(entry)`: normalize → bloom-check → visited-check →
    /// score-insert.
    pub async fn enqueue(&self, mut entry: QueueEntry) -> Result<EnqueueOutcome, QueueError> {
        if entry.depth > self.max_depth {
            return Err(QueueError::DepthExceeded {
                depth: entry.depth,
                max_depth: self.max_depth,
            });
        }

        let normalized =
            normalize_url(&entry.url).map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
        entry.url = normalized.clone();

        if self.bloom.seen(&normalized) {
            // Possibly seen: confirm against the authoritative visited set.
            if !self.sadd_visited(&normalized).await? {
                return Ok(EnqueueOutcome::AlreadySeen);
            }
        } else {
            self.bloom.add(&normalized);
            // Still must register in the authoritative set so future
            // lookups (including on other nodes, where this node's bloom
            // state hasn't propagated) see it as visited.
            self.sadd_visited(&normalized).await?;
        }

        let score = Self::now();
        let payload = serde_json::to_string(&entry).map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
        self.store.zadd(&self.tier_key(entry.priority), &payload, score).await?;
        Ok(EnqueueOutcome::Inserted)
    }

    /// Authoritative exact-dedup check: a dedicated per-URL key doubles as
    /// an O(1) set membership probe (the `visited` sorted set used by
    /// `total_pending`-adjacent bookkeeping would require an O(n) scan to
    /// test membership, which doesn't scale with the corpus size). Returns
    /// `true` if this is the first time `normalized` has been marked.
    async fn sadd_visited(&self, normalized: &str) -> Result<bool, QueueError> {
        let probe_key = format!("{}:member:{normalized}", self.visited_key());
        if self.store.exists(&probe_key).await? {
            return Ok(false);
        }
        self.store.set_ex(&probe_key, b"1", 0).await?;
        Ok(true)
    }

    /// `lease(max_wait)`: scan tiers highest-to-lowest priority; ask the
    /// rate governor for the candidate's domain; defer if denied, else move
    /// to the processing set with a lease expiry.
    pub async fn lease(&self, max_wait: Duration) -> Result<Option<QueueEntry>, QueueError> {
        let deadline = std::time::Instant::now() + max_wait;
        loop {
            for priority in Priority::ALL_DESCENDING {
                if let Some(entry) = self.try_lease_from_tier(*priority).await? {
                    return Ok(Some(entry));
                }
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn try_lease_from_tier(&self, priority: Priority) -> Result<Option<QueueEntry>, QueueError> {
        let tier_key = self.tier_key(priority);
        let Some((payload, _score)) = self.store.zrange_min_score(&tier_key).await? else {
            return Ok(None);
        };
        let mut entry: QueueEntry =
            serde_json::from_str(&payload).map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
        self.store.zremrangebyscore(&tier_key, _score, _score).await?;

        let domain = entry.domain().unwrap_or_default();
        match self.governor.try_acquire(&domain)? {
            RateLimitDecision::Allow => {
                let lease_id = Uuid::new_v4().to_string();
                entry.leased_at = Some(Self::now());
                entry.original_priority = priority;
                entry.lease_id = Some(lease_id.clone());
                let payload = serde_json::to_string(&entry)
                    .map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
                let lease_expiry = Self::now() + LEASE_TTL.as_secs_f64();
                // Member is the lease id, not the payload: the processing
                // set routinely holds many concurrently leased entries, so
                // `complete`/`fail` must be able to remove exactly this
                // lease's record rather than "whichever entry expires
                // soonest".
                self.store
                    .set_ex(&self.processing_entry_key(&lease_id), payload.as_bytes(), LEASE_TTL.as_secs() + 60)
                    .await?;
                self.store.zadd(&self.processing_key(), &lease_id, lease_expiry).await?;
                Ok(Some(entry))
            }
            RateLimitDecision::Deny { .. } => {
                entry.priority = Priority::Deferred;
                let defer_score = Self::now() + DEFER_DELAY.as_secs_f64();
                let payload = serde_json::to_string(&entry)
                    .map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
                self.store
                    .zadd(&self.tier_key(Priority::Deferred), &payload, defer_score)
                    .await?;
                Ok(None)
            }
        }
    }

    /// `complete(entry)`: remove this entry's lease from the processing set.
    pub async fn complete(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        self.release_lease(&entry.lease_id).await
    }

    /// `fail(entry, error)`: retry at Low priority with backoff, or promote
    /// to the failed set once `retry_count` is exhausted.
    pub async fn fail(&self, mut entry: QueueEntry, error: &str) -> Result<(), QueueError> {
        self.release_lease(&entry.lease_id).await?;
        entry.lease_id = None;
        entry.leased_at = None;

        entry.retry_count += 1;
        if entry.retry_count < MAX_RETRIES {
            entry.priority = Priority::Low;
            let score = Self::now() + 60.0 * entry.retry_count as f64;
            let payload = serde_json::to_string(&entry)
                .map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
            self.store.zadd(&self.tier_key(Priority::Low), &payload, score).await?;
        } else {
            warn!(url = %entry.url, error, "url exhausted retries, moving to failed set");
            let payload = serde_json::to_string(&entry)
                .map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
            self.store.zadd(&self.failed_key(), &payload, Self::now()).await?;
        }
        Ok(())
    }

    /// Remove a lease's member from the processing set and drop its
    /// side-stored payload. A no-op if the entry was never leased.
    async fn release_lease(&self, lease_id: &Option<String>) -> Result<(), QueueError> {
        let Some(lease_id) = lease_id else { return Ok(()) };
        self.store.zrem(&self.processing_key(), lease_id).await?;
        self.store.delete(&self.processing_entry_key(lease_id)).await?;
        Ok(())
    }

    /// Recovery loop tick: any processing entry whose lease has expired
    /// returns to its original tier. Intended to be driven every 60s by
    /// the orchestrator's monitor loop.
    pub async fn reclaim_expired_leases(&self) -> Result<usize, QueueError> {
        let processing_key = self.processing_key();
        let now = Self::now();
        let mut reclaimed = 0;
        // Drain lease ids whose expiry score has already passed, earliest
        // first; each is addressed by its own id, never by position.
        while let Some((lease_id, score)) = self.store.zrange_min_score(&processing_key).await? {
            if score > now {
                break;
            }
            self.store.zrem(&processing_key, &lease_id).await?;
            let entry_key = self.processing_entry_key(&lease_id);
            if let Ok(Some(bytes)) = self.store.get(&entry_key).await {
                if let Ok(mut entry) = serde_json::from_slice::<QueueEntry>(&bytes) {
                    info!(url = %entry.url, "reclaiming expired lease back to original tier");
                    entry.leased_at = None;
                    entry.lease_id = None;
                    let tier = entry.original_priority;
                    let requeue_score = Self::now();
                    let payload = serde_json::to_string(&entry)
                        .map_err(|e| QueueError::InvalidUrl(e.to_string()))?;
                    self.store.zadd(&self.tier_key(tier), &payload, requeue_score).await?;
                    reclaimed += 1;
                }
            }
            self.store.delete(&entry_key).await?;
        }
        Ok(reclaimed)
    }

    /// Total entries across all tiers plus processing, for the
    /// orchestrator's monitor loop termination condition.
    pub async fn total_pending(&self) -> Result<u64, QueueError> {
        let mut total = 0u64;
        for priority in Priority::ALL_DESCENDING {
            total += self.store.zcard(&self.tier_key(*priority)).await?;
        }
        Ok(total)
    }

    pub async fn processing_count(&self) -> Result<u64, QueueError> {
        Ok(self.store.zcard(&self.processing_key()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_descending() {
        assert_eq!(
            Priority::ALL_DESCENDING,
            &[
                Priority::Critical,
                Priority::High,
                Priority::Medium,
                Priority::Low,
                Priority::Deferred
            ]
        );
    }
}
