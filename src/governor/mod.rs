//! Rate governor — per-domain politeness enforcement.
//!
//! Two algorithms coexist:
//! - a lock-free local token bucket (`token_bucket`, cache-line-aligned
//!   `AtomicU128` packed state, CAS retry loop) for single-process rate
//!   limiting with `try_acquire`/`wait`.
//! - a distributed sliding window (`sliding_window`) backed by the shared
//!   `DistributedStore`'s sorted sets, for cross-node coordination.
//!
//! `crawl_delay` from robots.txt overrides the configured rps.

pub mod sliding_window;
pub mod token_bucket;

pub use sliding_window::SlidingWindowGovernor;
pub use token_bucket::{RateLimitDecision, TokenBucketGovernor};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernorError {
    /// Only raised for an empty domain string; any other domain is
    /// auto-registered with defaults on first use.
    #[error("domain is unknown (empty domain string)")]
    DomainUnknown,
}

/// Combine a configured rps with an optional robots `crawl-delay`
/// (seconds/request) to get the effective rps:
/// `effective rps = min(configured, 1/crawl_delay)`.
#[must_use]
pub fn effective_rps(configured_rps: f64, crawl_delay_secs: Option<f64>) -> f64 {
    match crawl_delay_secs {
        Some(delay) if delay > 0.0 => configured_rps.min(1.0 / delay),
        _ => configured_rps,
    }
}

fn validate_domain(domain: &str) -> Result<(), GovernorError> {
    if domain.is_empty() {
        Err(GovernorError::DomainUnknown)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_delay_overrides_when_stricter() {
        assert!((effective_rps(5.0, Some(1.0)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn configured_rps_wins_when_crawl_delay_looser() {
        assert!((effective_rps(0.5, Some(1.0)) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_domain_is_rejected() {
        assert_eq!(validate_domain(""), Err(GovernorError::DomainUnknown));
        assert!(validate_domain("example.com").is_ok());
    }
}
