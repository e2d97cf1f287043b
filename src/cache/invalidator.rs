//! Cache invalidator: rule-driven invalidation with a bidirectional key
//! dependency graph and a batched event processor.
//!
//! `InvalidationRule` covers Immediate/Delayed/Scheduled/Cascade/
//! Pattern/Tag/Ttl/Event strategies; `add_dependency` maintains
//! forward/reverse maps for transitive cascade, and a batch processor
//! drains an event queue every ≤100ms or 100 events.

use crate::cache::manager::CacheManager;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationRule {
    Immediate(String),
    Delayed(String, Duration),
    Scheduled(String, u64),
    Cascade(String),
    Pattern(String),
    Tag(String),
    Ttl(String),
    Event(String),
}

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    pub rule: InvalidationRule,
    pub enqueued_at: Instant,
}

const BATCH_SIZE: usize = 100;
const BATCH_LINGER: Duration = Duration::from_millis(100);

pub struct CacheInvalidator {
    manager: Arc<CacheManager>,
    dependencies: DashMap<String, HashSet<String>>,
    reverse_dependencies: DashMap<String, HashSet<String>>,
    sender: mpsc::UnboundedSender<InvalidationEvent>,
    failures: AtomicU64,
}

impl CacheInvalidator {
    #[must_use]
    pub fn new(manager: Arc<CacheManager>) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let invalidator = Arc::new(Self {
            manager,
            dependencies: DashMap::new(),
            reverse_dependencies: DashMap::new(),
            sender,
            failures: AtomicU64::new(0),
        });
        invalidator.clone().spawn_batch_processor(receiver);
        invalidator
    }

    pub fn add_dependency(&self, key: &str, depends_on: &[String]) {
        self.dependencies.entry(key.to_string()).or_default().extend(depends_on.iter().cloned());
        for dep in depends_on {
            self.reverse_dependencies.entry(dep.clone()).or_default().insert(key.to_string());
        }
    }

    /// Enqueue an invalidation; the batch processor coalesces and
    /// deduplicates before dispatching.
    pub fn invalidate(&self, rule: InvalidationRule) {
        let _ = self.sender.send(InvalidationEvent { rule, enqueued_at: Instant::now() });
    }

    fn cascade_targets(&self, key: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([key.to_string()]);
        let mut result = Vec::new();
        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.reverse_dependencies.get(&current) {
                for dependent in dependents.iter() {
                    if visited.insert(dependent.clone()) {
                        result.push(dependent.clone());
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
        result
    }

    async fn dispatch(&self, rule: &InvalidationRule) -> Result<(), crate::cache::CacheError> {
        match rule {
            InvalidationRule::Immediate(key) | InvalidationRule::Ttl(key) | InvalidationRule::Event(key) => {
                self.manager.delete(key).await
            }
            InvalidationRule::Delayed(key, delay) => {
                tokio::time::sleep(*delay).await;
                self.manager.delete(key).await
            }
            InvalidationRule::Scheduled(key, unix_time) => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                if *unix_time > now {
                    tokio::time::sleep(Duration::from_secs(*unix_time - now)).await;
                }
                self.manager.delete(key).await
            }
            InvalidationRule::Cascade(key) => {
                self.manager.delete(key).await?;
                for dependent in self.cascade_targets(key) {
                    self.manager.delete(&dependent).await?;
                }
                Ok(())
            }
            InvalidationRule::Pattern(_) | InvalidationRule::Tag(_) => {
                // Application-layer tag/pattern invalidation is handled by
                // `ApplicationCache::invalidate_tag`/`invalidate_pattern`
                // directly; this path exists so callers can still route
                // through the unified event queue for metrics/batching.
                Ok(())
            }
        }
    }

    fn spawn_batch_processor(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<InvalidationEvent>) {
        tokio::spawn(async move {
            let mut batch: Vec<InvalidationEvent> = Vec::new();
            loop {
                let deadline = tokio::time::sleep(BATCH_LINGER);
                tokio::pin!(deadline);
                tokio::select! {
                    maybe_event = receiver.recv() => {
                        match maybe_event {
                            Some(event) => batch.push(event),
                            None => return,
                        }
                        while batch.len() < BATCH_SIZE {
                            match receiver.try_recv() {
                                Ok(event) => batch.push(event),
                                Err(_) => break,
                            }
                        }
                    }
                    () = &mut deadline => {}
                }

                if batch.is_empty() {
                    continue;
                }
                let deduped = dedupe(std::mem::take(&mut batch));
                for event in deduped {
                    if let Err(err) = self.dispatch(&event.rule).await {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(%err, "invalidation dispatch failed, continuing batch");
                    }
                }
            }
        });
    }

    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

fn dedupe(batch: Vec<InvalidationEvent>) -> Vec<InvalidationEvent> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(batch.len());
    for event in batch {
        if seen.insert(event.rule.clone()) {
            out.push(event);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::app::EvictionPolicy;
    use crate::cache::{ApplicationCache, DistributedCache};
    use crate::store::DistributedStore;

    fn test_invalidator() -> Arc<CacheInvalidator> {
        let application = Arc::new(ApplicationCache::new(1024 * 1024, 1000, 3600.0, EvictionPolicy::Lru));
        let distributed = Arc::new(DistributedCache::new(DistributedStore::connect("redis://127.0.0.1:0").unwrap(), "test"));
        let manager = Arc::new(CacheManager::new(application, distributed));
        CacheInvalidator::new(manager)
    }

    #[test]
    fn cascade_targets_follows_transitive_dependents() {
        let invalidator = test_invalidator();
        // b and c depend on a; d depends on c. Invalidating a must reach d.
        invalidator.add_dependency("b", &["a".to_string()]);
        invalidator.add_dependency("c", &["a".to_string()]);
        invalidator.add_dependency("d", &["c".to_string()]);

        let mut targets = invalidator.cascade_targets("a");
        targets.sort();
        assert_eq!(targets, vec!["b".to_string(), "c".to_string(), "d".to_string()]);
    }

    #[test]
    fn cascade_targets_does_not_revisit_a_diamond_dependency_twice() {
        let invalidator = test_invalidator();
        // b and c both depend on a; d depends on both b and c.
        invalidator.add_dependency("b", &["a".to_string()]);
        invalidator.add_dependency("c", &["a".to_string()]);
        invalidator.add_dependency("d", &["b".to_string(), "c".to_string()]);

        let mut targets = invalidator.cascade_targets("a");
        targets.sort();
        targets.dedup();
        let mut unsorted = invalidator.cascade_targets("a");
        unsorted.sort();
        assert_eq!(targets, unsorted, "cascade_targets must not report a dependent more than once");
    }

    #[test]
    fn cascade_targets_with_no_dependents_is_empty() {
        let invalidator = test_invalidator();
        assert!(invalidator.cascade_targets("lonely").is_empty());
    }

    #[test]
    fn dedupe_collapses_repeated_rules_keeping_first_occurrence() {
        let batch = vec![
            InvalidationEvent { rule: InvalidationRule::Immediate("a".into()), enqueued_at: Instant::now() },
            InvalidationEvent { rule: InvalidationRule::Immediate("a".into()), enqueued_at: Instant::now() },
            InvalidationEvent { rule: InvalidationRule::Cascade("b".into()), enqueued_at: Instant::now() },
        ];
        let deduped = dedupe(batch);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].rule, InvalidationRule::Immediate("a".into()));
        assert_eq!(deduped[1].rule, InvalidationRule::Cascade("b".into()));
    }
}
