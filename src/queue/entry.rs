use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Five priority tiers, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Deferred,
}

impl Priority {
    pub const ALL_DESCENDING: &'static [Priority] = &[
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Deferred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Deferred => "deferred",
        }
    }
}

/// A single queued URL with enough context to score, lease, and recover it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: String,
    pub priority: Priority,
    pub depth: u32,
    pub referrer: Option<String>,
    pub discovered_at: f64,
    pub retry_count: u32,
    pub metadata: HashMap<String, String>,

    /// Populated once a lease is granted; `None` while the entry sits in a
    /// tier. Cleared again by `reclaim_expired_leases`.
    #[serde(default)]
    pub leased_at: Option<f64>,
    /// The tier the entry was leased from, so an expired lease or a
    /// deferred retry can be returned to the right place.
    #[serde(default = "default_priority")]
    pub original_priority: Priority,
    /// Stable identifier for the current lease, assigned when the entry
    /// moves into the processing set. Used to address this entry's
    /// processing-set member and side-stored payload precisely, since
    /// the processing set routinely holds many concurrently leased
    /// entries and payload/score equality cannot distinguish between them.
    #[serde(default)]
    pub lease_id: Option<String>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

impl QueueEntry {
    #[must_use]
    pub fn new(url: impl Into<String>, priority: Priority, depth: u32) -> Self {
        Self {
            url: url.into(),
            priority,
            depth,
            referrer: None,
            discovered_at: 0.0,
            retry_count: 0,
            metadata: HashMap::new(),
            leased_at: None,
            original_priority: priority,
            lease_id: None,
        }
    }

    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Extract the host for rate-governor/robots lookups.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extracts_host() {
        let entry = QueueEntry::new("https://example.com/a", Priority::High, 0);
        assert_eq!(entry.domain().as_deref(), Some("example.com"));
    }

    #[test]
    fn invalid_url_has_no_domain() {
        let entry = QueueEntry::new("not a url", Priority::Low, 0);
        assert_eq!(entry.domain(), None);
    }
}
