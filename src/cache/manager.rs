//! Cache manager: layered get/set/delete across Edge, Distributed,
//! Application, and a process-local layer, with promote-on-hit and a
//! warming scheduler. Edge/Distributed/Application/Local is kept as one
//! enum with concrete Rust backing types (`ApplicationCache`,
//! `DistributedCache`, a small local `DashMap`).

use crate::cache::{ApplicationCache, CacheError, DistributedCache};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheLayer {
    Edge,
    Distributed,
    Application,
    Local,
}

#[derive(Debug, Default)]
struct LayerStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct LayerMetrics {
    pub layer: CacheLayer,
    pub hits: u64,
    pub misses: u64,
}

type WarmerFn = Arc<dyn Fn() -> Vec<(String, Vec<u8>)> + Send + Sync>;

pub struct CacheManager {
    local: DashMap<String, (Vec<u8>, Instant)>,
    local_ttl: Duration,
    application: Arc<ApplicationCache>,
    distributed: Arc<DistributedCache>,
    metrics: DashMap<CacheLayer, LayerStats>,
    warmers: DashMap<String, (WarmerFn, Duration)>,
    invalidation_callbacks: parking_lot::Mutex<Vec<Arc<dyn Fn(&str) + Send + Sync>>>,
}

impl CacheManager {
    #[must_use]
    pub fn new(application: Arc<ApplicationCache>, distributed: Arc<DistributedCache>) -> Self {
        let metrics = DashMap::new();
        for layer in [CacheLayer::Edge, CacheLayer::Distributed, CacheLayer::Application, CacheLayer::Local] {
            metrics.insert(layer, LayerStats::default());
        }
        Self {
            local: DashMap::new(),
            local_ttl: Duration::from_secs(30),
            application,
            distributed,
            metrics,
            warmers: DashMap::new(),
            invalidation_callbacks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn record(&self, layer: CacheLayer, hit: bool) {
        if let Some(stats) = self.metrics.get(&layer) {
            if hit {
                stats.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                stats.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Walk Distributed → Application → Local in order (Edge has no
    /// process-local readable state); on a hit at a lower layer, promote
    /// the value to every layer above it.
    ///
    /// `layers`, if given, restricts which layers are consulted — a miss
    /// on an excluded layer is never recorded and that layer is never
    /// read from or promoted to. `None` reads every readable layer, in
    /// the same order as an unrestricted `get`.
    pub async fn get(&self, key: &str, layers: Option<&[CacheLayer]>) -> Result<Option<Vec<u8>>, CacheError> {
        let wants = |layer: CacheLayer| layers.is_none_or(|l| l.contains(&layer));

        if wants(CacheLayer::Local) {
            if let Some(entry) = self.local.get(key) {
                if entry.1.elapsed() < self.local_ttl {
                    self.record(CacheLayer::Local, true);
                    return Ok(Some(entry.0.clone()));
                }
            }
            self.record(CacheLayer::Local, false);
        }

        if wants(CacheLayer::Application) {
            if let Some(value) = self.application.get(key) {
                self.record(CacheLayer::Application, true);
                if wants(CacheLayer::Local) {
                    self.local.insert(key.to_string(), (value.clone(), Instant::now()));
                }
                return Ok(Some(value));
            }
            self.record(CacheLayer::Application, false);
        }

        if wants(CacheLayer::Distributed) {
            if let Some(value) = self.distributed.get::<Vec<u8>>(key).await? {
                self.record(CacheLayer::Distributed, true);
                if wants(CacheLayer::Application) {
                    self.application.set(key, value.clone(), None, 1.0, HashSet::new());
                }
                if wants(CacheLayer::Local) {
                    self.local.insert(key.to_string(), (value.clone(), Instant::now()));
                }
                return Ok(Some(value));
            }
            self.record(CacheLayer::Distributed, false);
        }
        Ok(None)
    }

    /// Write to every layer in `layers` concurrently (`None` writes to
    /// every writable layer: Local, Application, Distributed).
    pub async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: u64,
        layers: Option<&[CacheLayer]>,
    ) -> Result<(), CacheError> {
        let wants = |layer: CacheLayer| layers.is_none_or(|l| l.contains(&layer));

        if wants(CacheLayer::Local) {
            self.local.insert(key.to_string(), (value.clone(), Instant::now()));
        }
        if wants(CacheLayer::Application) {
            self.application.set(key, value.clone(), Some(ttl_secs as f64), 1.0, HashSet::new());
        }
        if wants(CacheLayer::Distributed) {
            self.distributed.set(key, &value, ttl_secs).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.local.remove(key);
        self.application.delete(key);
        self.distributed.delete(key).await?;
        for callback in self.invalidation_callbacks.lock().iter() {
            callback(key);
        }
        Ok(())
    }

    pub async fn mget(&self, keys: &[String], layers: Option<&[CacheLayer]>) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key, layers).await?);
        }
        Ok(out)
    }

    pub async fn mset(&self, entries: Vec<(String, Vec<u8>, u64)>, layers: Option<&[CacheLayer]>) -> Result<(), CacheError> {
        for (key, value, ttl) in entries {
            self.set(&key, value, ttl, layers).await?;
        }
        Ok(())
    }

    pub fn register_invalidation_callback(&self, callback: Arc<dyn Fn(&str) + Send + Sync>) {
        self.invalidation_callbacks.lock().push(callback);
    }

    pub fn register_warming_function(&self, key_pattern: impl Into<String>, interval: Duration, warmer: WarmerFn) {
        self.warmers.insert(key_pattern.into(), (warmer, interval));
    }

    /// Run all registered warmers once on their own interval loop.
    pub fn spawn_warming_scheduler(self: &Arc<Self>) {
        for entry in self.warmers.iter() {
            let (pattern, (warmer, interval)) = (entry.key().clone(), entry.value().clone());
            let manager = self.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    let items = warmer();
                    info!(pattern = %pattern, count = items.len(), "cache warming tick");
                    for (key, value) in items {
                        if let Err(err) = manager.set(&key, value, interval.as_secs(), None).await {
                            tracing::warn!(%err, "cache warming set failed");
                        }
                    }
                }
            });
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Vec<LayerMetrics> {
        self.metrics
            .iter()
            .map(|e| LayerMetrics {
                layer: *e.key(),
                hits: e.value().hits.load(Ordering::Relaxed),
                misses: e.value().misses.load(Ordering::Relaxed),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::app::EvictionPolicy;
    use crate::store::DistributedStore;

    fn test_manager() -> CacheManager {
        let application = Arc::new(ApplicationCache::new(1024 * 1024, 1000, 3600.0, EvictionPolicy::Lru));
        let distributed = Arc::new(DistributedCache::new(DistributedStore::connect("redis://127.0.0.1:0").unwrap(), "test"));
        CacheManager::new(application, distributed)
    }

    #[tokio::test]
    async fn set_restricted_to_application_never_populates_local() {
        let manager = test_manager();
        manager.set("k", b"v".to_vec(), 60, Some(&[CacheLayer::Application])).await.unwrap();

        // A Local-only read must miss: the restricted set never touched Local.
        let local_only = manager.get("k", Some(&[CacheLayer::Local])).await.unwrap();
        assert_eq!(local_only, None);

        // An Application-only read sees it.
        let app_only = manager.get("k", Some(&[CacheLayer::Application])).await.unwrap();
        assert_eq!(app_only, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn unrestricted_get_promotes_through_every_layer_above_the_hit() {
        let manager = test_manager();
        manager.set("k", b"v".to_vec(), 60, Some(&[CacheLayer::Application])).await.unwrap();

        // First unrestricted get hits Application and promotes into Local.
        let first = manager.get("k", None).await.unwrap();
        assert_eq!(first, Some(b"v".to_vec()));

        // Second read now hits Local directly.
        let local_only = manager.get("k", Some(&[CacheLayer::Local])).await.unwrap();
        assert_eq!(local_only, Some(b"v".to_vec()));
    }
}
