//! Local lock-free token-bucket governor, per domain.
//!
//! Cache-line-aligned `AtomicU128` packed state (tokens in the upper 64
//! bits, last-refill-nanos in the lower 64), CAS retry loop, exposed as
//! `try_acquire`/`wait` over an explicit `domain`.

use super::{validate_domain, GovernorError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU128, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TOKEN_SCALE: u64 = 1000;
const RATE_SCALE: u64 = 1_000_000;

#[inline(always)]
fn pack_state(tokens: u64, last_refill_nanos: u64) -> u128 {
    ((tokens as u128) << 64) | (last_refill_nanos as u128)
}

#[inline(always)]
fn unpack_state(packed: u128) -> (u64, u64) {
    let tokens = (packed >> 64) as u64;
    let last_refill_nanos = (packed & 0xFFFF_FFFF_FFFF_FFFF) as u64;
    (tokens, last_refill_nanos)
}

/// Rate limit decision: allow, or deny with a retry-after hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny { retry_after: Duration },
}

/// Cache-line-aligned per-domain token bucket (one cache line on x86-64;
/// avoids false sharing between concurrently-accessed domains).
#[repr(C, align(64))]
struct DomainBucket {
    state: AtomicU128,
    rate_per_nano: u64,
    max_tokens: u64,
    _padding: [u8; 32],
}

impl DomainBucket {
    fn new(rps: f64, burst: f64, base_time: &Instant) -> Self {
        let max_tokens = (burst.max(1.0) * TOKEN_SCALE as f64) as u64;
        let rate_per_nano =
            ((rps * TOKEN_SCALE as f64 * RATE_SCALE as f64) / 1_000_000_000.0) as u64;
        let now_nanos = base_time.elapsed().as_nanos() as u64;
        Self {
            state: AtomicU128::new(pack_state(max_tokens, now_nanos)),
            rate_per_nano,
            max_tokens,
            _padding: [0u8; 32],
        }
    }

    fn refill(&self, now_nanos: u64) {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (tokens, last_refill) = unpack_state(current);
            if now_nanos <= last_refill {
                return;
            }
            let elapsed = now_nanos.saturating_sub(last_refill);
            let tokens_to_add = elapsed.saturating_mul(self.rate_per_nano) / RATE_SCALE;
            let time_credited = if self.rate_per_nano > 0 {
                tokens_to_add.saturating_mul(RATE_SCALE) / self.rate_per_nano
            } else {
                0
            };
            let new_last_refill = last_refill.saturating_add(time_credited);
            let new_tokens = if tokens_to_add > 0 {
                tokens.saturating_add(tokens_to_add).min(self.max_tokens)
            } else {
                tokens
            };
            let new_state = pack_state(new_tokens, new_last_refill);
            match self.state.compare_exchange_weak(
                current,
                new_state,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    fn try_consume(&self, base_time: &Instant) -> RateLimitDecision {
        let now_nanos = base_time.elapsed().as_nanos() as u64;
        self.refill(now_nanos);

        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (tokens, last_refill) = unpack_state(current);
            if tokens < TOKEN_SCALE {
                let needed = TOKEN_SCALE.saturating_sub(tokens);
                let nanos_needed = if self.rate_per_nano > 0 {
                    needed.saturating_mul(RATE_SCALE) / self.rate_per_nano
                } else {
                    1_000_000
                };
                return RateLimitDecision::Deny {
                    retry_after: Duration::from_nanos(nanos_needed),
                };
            }
            let new_tokens = tokens - TOKEN_SCALE;
            let new_state = pack_state(new_tokens, last_refill);
            match self.state.compare_exchange_weak(
                current,
                new_state,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return RateLimitDecision::Allow,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

/// Per-domain token-bucket governor. One instance per process; domains are
/// created lazily on first access with the given defaults.
pub struct TokenBucketGovernor {
    buckets: DashMap<String, Arc<DomainBucket>>,
    base_time: Instant,
    default_rps: f64,
    default_burst: f64,
}

impl TokenBucketGovernor {
    #[must_use]
    pub fn new(default_rps: f64, default_burst: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            base_time: Instant::now(),
            default_rps,
            default_burst,
        }
    }

    fn bucket_for(&self, domain: &str, rps: f64, burst: f64) -> Arc<DomainBucket> {
        Arc::clone(
            self.buckets
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(DomainBucket::new(rps, burst, &self.base_time)))
                .value(),
        )
    }

    /// Non-blocking check.
    pub fn try_acquire(&self, domain: &str) -> Result<RateLimitDecision, GovernorError> {
        validate_domain(domain)?;
        let bucket = self.bucket_for(domain, self.default_rps, self.default_burst);
        Ok(bucket.try_consume(&self.base_time))
    }

    /// Same as `try_acquire` but with an explicit effective rps (e.g. after
    /// applying a robots `crawl-delay` override via `effective_rps`).
    pub fn try_acquire_with_rate(
        &self,
        domain: &str,
        rps: f64,
        burst: f64,
    ) -> Result<RateLimitDecision, GovernorError> {
        validate_domain(domain)?;
        let bucket = self.bucket_for(domain, rps, burst);
        Ok(bucket.try_consume(&self.base_time))
    }

    /// Blocking variant bounded by `max_wait`. Returns the actual wait
    /// duration, or `None` if the bound was exceeded before a token
    /// became available.
    pub async fn wait(
        &self,
        domain: &str,
        max_wait: Duration,
    ) -> Result<Option<Duration>, GovernorError> {
        let deadline = Instant::now() + max_wait;
        let waited_start = Instant::now();
        loop {
            match self.try_acquire(domain)? {
                RateLimitDecision::Allow => return Ok(Some(waited_start.elapsed())),
                RateLimitDecision::Deny { retry_after } => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    let sleep_for = retry_after.min(deadline - now);
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    }

    pub fn tracked_domains(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_allowed_second_denied_at_rps_one() {
        let gov = TokenBucketGovernor::new(1.0, 1.0);
        assert_eq!(gov.try_acquire("example.com").unwrap(), RateLimitDecision::Allow);
        assert!(matches!(
            gov.try_acquire("example.com").unwrap(),
            RateLimitDecision::Deny { .. }
        ));
    }

    #[test]
    fn empty_domain_rejected() {
        let gov = TokenBucketGovernor::new(1.0, 1.0);
        assert_eq!(gov.try_acquire(""), Err(GovernorError::DomainUnknown));
    }

    #[tokio::test]
    async fn wait_eventually_allows_within_bound() {
        let gov = TokenBucketGovernor::new(20.0, 1.0);
        gov.try_acquire("example.com").unwrap();
        let waited = gov
            .wait("example.com", Duration::from_millis(500))
            .await
            .unwrap();
        assert!(waited.is_some());
    }
}
