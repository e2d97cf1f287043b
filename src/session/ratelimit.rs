//! Purpose-specific rate limits, layered over the distributed
//! sliding-window governor with per-purpose minute/hour/day windows.
//!
//! Per-endpoint limit tuples (login 5/min·20/hr·100/day, password-reset
//! 2/min·5/hr·10/day, mfa-verify 10/min·30/hr·100/day) reuse the rate
//! governor's sliding window instead of a second limiter
//! implementation.

use crate::governor::sliding_window::SlidingWindowGovernor;
use crate::store::DistributedStore;

#[derive(Debug, Clone, Copy)]
pub struct WindowLimit {
    pub burst: f64,
    pub window_secs: f64,
}

impl WindowLimit {
    const fn new(burst: f64, window_secs: f64) -> Self {
        Self { burst, window_secs }
    }

    fn rps(self) -> f64 {
        self.burst / self.window_secs
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PurposeLimits {
    pub per_minute: WindowLimit,
    pub per_hour: WindowLimit,
    pub per_day: WindowLimit,
}

pub const LOGIN_LIMITS: PurposeLimits = PurposeLimits {
    per_minute: WindowLimit::new(5.0, 60.0),
    per_hour: WindowLimit::new(20.0, 3600.0),
    per_day: WindowLimit::new(100.0, 86400.0),
};

pub const PASSWORD_RESET_LIMITS: PurposeLimits = PurposeLimits {
    per_minute: WindowLimit::new(2.0, 60.0),
    per_hour: WindowLimit::new(5.0, 3600.0),
    per_day: WindowLimit::new(10.0, 86400.0),
};

pub const MFA_VERIFY_LIMITS: PurposeLimits = PurposeLimits {
    per_minute: WindowLimit::new(10.0, 60.0),
    per_hour: WindowLimit::new(30.0, 3600.0),
    per_day: WindowLimit::new(100.0, 86400.0),
};

pub struct SessionRateLimiter {
    governor: SlidingWindowGovernor,
}

impl SessionRateLimiter {
    #[must_use]
    pub fn new(store: DistributedStore, namespace: impl Into<String>) -> Self {
        Self { governor: SlidingWindowGovernor::new(store, namespace) }
    }

    /// Check every window for a purpose/identity pair (usually client IP);
    /// all must allow, since each window is an independent cap.
    pub async fn check(&self, purpose: &str, identity: &str, limits: PurposeLimits) -> bool {
        for (suffix, limit) in [("min", limits.per_minute), ("hour", limits.per_hour), ("day", limits.per_day)] {
            let scoped_domain = format!("{purpose}:{identity}:{suffix}");
            match self.governor.allow(&scoped_domain, limit.rps(), limit.burst).await {
                Ok(true) => continue,
                Ok(false) => return false,
                Err(_) => continue,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_limits_have_expected_burst_values() {
        assert_eq!(LOGIN_LIMITS.per_minute.burst, 5.0);
        assert_eq!(LOGIN_LIMITS.per_hour.burst, 20.0);
        assert_eq!(LOGIN_LIMITS.per_day.burst, 100.0);
    }
}
