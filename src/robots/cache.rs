//! Two-tier robots.txt cache: an in-process `DashMap` (hot path, no network
//! round trip) backed by the shared `DistributedStore` (cross-node reuse),
//! mirroring the app-cache/distributed-cache layering used elsewhere in the
//! crate — local cache, fall through to distributed, fall through to
//! fetch.

use super::parser::{self, RobotsRules};
use super::RobotsError;
use crate::store::DistributedStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LOCAL_TTL: Duration = Duration::from_secs(60 * 60);
const DISTRIBUTED_TTL_SECS: u64 = 24 * 60 * 60;

struct LocalEntry {
    rules: Arc<RobotsRules>,
    expires_at: Instant,
}

pub struct RobotsCache {
    local: DashMap<String, LocalEntry>,
    store: Option<DistributedStore>,
    namespace: String,
}

impl RobotsCache {
    #[must_use]
    pub fn new(store: Option<DistributedStore>, namespace: impl Into<String>) -> Self {
        Self {
            local: DashMap::new(),
            store,
            namespace: namespace.into(),
        }
    }

    fn dist_key(&self, domain: &str) -> String {
        format!("{}:robots:{domain}", self.namespace)
    }

    pub async fn get(&self, domain: &str) -> Result<Option<Arc<RobotsRules>>, RobotsError> {
        if let Some(entry) = self.local.get(domain) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(Arc::clone(&entry.rules)));
            }
        }

        let Some(store) = &self.store else {
            return Ok(None);
        };
        // Distributed-store errors degrade to a cache miss: the caller
        // falls through to an actual fetch rather than failing.
        let Ok(Some(bytes)) = store.get(&self.dist_key(domain)).await else {
            return Ok(None);
        };
        let Ok(rules) = bincode::deserialize::<RobotsRules>(&bytes) else {
            return Ok(None);
        };
        let rules = Arc::new(rules);
        self.local.insert(
            domain.to_string(),
            LocalEntry {
                rules: Arc::clone(&rules),
                expires_at: Instant::now() + LOCAL_TTL,
            },
        );
        Ok(Some(rules))
    }

    pub async fn put(&self, domain: &str, text: &str) -> Result<Arc<RobotsRules>, RobotsError> {
        let rules = Arc::new(parser::parse(text));
        self.local.insert(
            domain.to_string(),
            LocalEntry {
                rules: Arc::clone(&rules),
                expires_at: Instant::now() + LOCAL_TTL,
            },
        );
        if let Some(store) = &self.store {
            if let Ok(bytes) = bincode::serialize(rules.as_ref()) {
                let _ = store
                    .set_ex(&self.dist_key(domain), &bytes, DISTRIBUTED_TTL_SECS)
                    .await;
            }
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_without_distributed_store_returns_none() {
        let cache = RobotsCache::new(None, "test");
        assert!(cache.get("example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_hits_local_tier() {
        let cache = RobotsCache::new(None, "test");
        cache.put("example.com", "User-agent: *\nDisallow: /x").await.unwrap();
        let rules = cache.get("example.com").await.unwrap();
        assert!(rules.is_some());
        assert!(!rules.unwrap().is_allowed("AnyBot", "/x"));
    }
}
