use crate::dedup::DedupEngine;
use crate::queue::{Priority, PriorityQueue, QueueEntry};
use crate::robots::RobotsGateway;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

use super::OrchestratorError;

pub type CallbackFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub max_pages: Option<u64>,
    pub concurrent_crawls_per_worker: usize,
    pub default_rps: f64,
    pub default_burst: f64,
    pub discover_sitemaps: bool,
    pub retention: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: 5,
            max_pages: None,
            concurrent_crawls_per_worker: 4,
            default_rps: 1.0,
            default_burst: 5.0,
            discover_sitemaps: true,
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Transitions: `Pending` → `Running` → one of the three terminal states.
/// Terminal states are immutable once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct JobStats {
    pub status: JobStatus,
    pub pages_crawled: u64,
    pub pending: u64,
    pub processing: u64,
}

pub struct JobHandle {
    pub id: String,
    pub config: JobConfig,
    pub queue: Arc<PriorityQueue>,
    pub dedup: Arc<DedupEngine>,
    pub callback: Option<CallbackFn>,
    status: std::sync::RwLock<JobStatus>,
    pages_crawled: AtomicU64,
    cancelled: AtomicBool,
    last_progress: Mutex<Instant>,
}

impl JobHandle {
    #[must_use]
    pub fn new(
        id: String,
        config: JobConfig,
        queue: Arc<PriorityQueue>,
        dedup: Arc<DedupEngine>,
    ) -> Self {
        Self {
            id,
            config,
            queue,
            dedup,
            callback: None,
            status: std::sync::RwLock::new(JobStatus::Pending),
            pages_crawled: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            last_progress: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: CallbackFn) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.set_status(JobStatus::Cancelled);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        *self.status.read().unwrap()
    }

    /// Set the job status. A no-op once the job is already in a terminal
    /// state (`Completed`, `Failed`, `Cancelled`), since those are
    /// immutable.
    pub fn set_status(&self, status: JobStatus) {
        let mut current = self.status.write().unwrap();
        if matches!(*current, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled) {
            return;
        }
        *current = status;
    }

    #[must_use]
    pub fn max_pages_reached(&self) -> bool {
        match self.config.max_pages {
            Some(max) => self.pages_crawled.load(Ordering::Relaxed) >= max,
            None => false,
        }
    }

    pub fn record_page_crawled(&self) {
        self.pages_crawled.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn touch_progress(&self) {
        *self.last_progress.lock().await = Instant::now();
    }

    pub async fn stalled_for(&self) -> Duration {
        self.last_progress.lock().await.elapsed()
    }

    pub async fn stats(&self) -> JobStats {
        JobStats {
            status: self.status(),
            pages_crawled: self.pages_crawled.load(Ordering::Relaxed),
            pending: self.queue.total_pending().await.unwrap_or(0),
            processing: self.queue.processing_count().await.unwrap_or(0),
        }
    }
}

/// Alias kept for external callers that want a typed handle rather than
/// threading job ids everywhere.
pub type CrawlJob = JobHandle;

/// Seed the queue with configured start URLs at `High` priority, and, if
/// enabled, discover sitemap URLs per domain and enqueue them prioritized
/// by the sitemap's declared `priority` field.
pub async fn seed(handle: &JobHandle, robots: &RobotsGateway) -> Result<(), OrchestratorError> {
    for seed_url in &handle.config.seeds {
        let entry = QueueEntry::new(seed_url.clone(), Priority::High, 0);
        handle.queue.enqueue(entry).await?;
    }

    if !handle.config.discover_sitemaps {
        return Ok(());
    }

    for seed_url in &handle.config.seeds {
        let Ok(parsed) = url::Url::parse(seed_url) else { continue };
        let Some(domain) = parsed.host_str().map(str::to_string) else { continue };
        let sitemap_urls = robots.discover_urls(&domain).await.unwrap_or_default();
        for entry in sitemap_urls {
            let priority = sitemap_priority_tier(entry.priority);
            let queue_entry = QueueEntry::new(entry.loc, priority, 1);
            if let Err(err) = handle.queue.enqueue(queue_entry).await {
                info!(job_id = %handle.id, %err, "sitemap seed enqueue failed");
            }
        }
    }
    handle.set_status(JobStatus::Running);
    Ok(())
}

fn sitemap_priority_tier(priority: Option<f32>) -> Priority {
    match priority {
        Some(p) if p >= 0.8 => Priority::High,
        Some(p) if p >= 0.5 => Priority::Medium,
        _ => Priority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::BloomDeduper;
    use crate::dedup::DedupPolicy;
    use crate::governor::TokenBucketGovernor;
    use crate::store::DistributedStore;

    fn test_handle() -> JobHandle {
        let store = DistributedStore::connect("redis://127.0.0.1:0").unwrap();
        let bloom = Arc::new(BloomDeduper::new(10_000, 0.01));
        let governor = Arc::new(TokenBucketGovernor::new(1.0, 5.0));
        let queue = Arc::new(PriorityQueue::new(store, bloom, governor, "test", 5));
        let dedup = Arc::new(DedupEngine::new(DedupPolicy::default()));
        JobHandle::new("job-1".to_string(), JobConfig::default(), queue, dedup)
    }

    #[test]
    fn new_job_starts_pending() {
        let handle = test_handle();
        assert_eq!(handle.status(), JobStatus::Pending);
    }

    #[test]
    fn terminal_status_is_immutable() {
        let handle = test_handle();
        handle.set_status(JobStatus::Running);
        handle.set_status(JobStatus::Completed);
        assert_eq!(handle.status(), JobStatus::Completed);

        // Once terminal, neither a different terminal state nor a
        // transitional one can overwrite it.
        handle.set_status(JobStatus::Failed);
        assert_eq!(handle.status(), JobStatus::Completed);
        handle.set_status(JobStatus::Running);
        assert_eq!(handle.status(), JobStatus::Completed);
    }

    #[test]
    fn cancel_sets_both_flag_and_terminal_status() {
        let handle = test_handle();
        handle.set_status(JobStatus::Running);
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(handle.status(), JobStatus::Cancelled);
    }

    #[test]
    fn max_pages_reached_respects_configured_limit() {
        let mut config = JobConfig::default();
        config.max_pages = Some(2);
        let store = DistributedStore::connect("redis://127.0.0.1:0").unwrap();
        let bloom = Arc::new(BloomDeduper::new(10_000, 0.01));
        let governor = Arc::new(TokenBucketGovernor::new(1.0, 5.0));
        let queue = Arc::new(PriorityQueue::new(store, bloom, governor, "test", 5));
        let dedup = Arc::new(DedupEngine::new(DedupPolicy::default()));
        let handle = JobHandle::new("job-2".to_string(), config, queue, dedup);

        assert!(!handle.max_pages_reached());
        handle.record_page_crawled();
        assert!(!handle.max_pages_reached());
        handle.record_page_crawled();
        assert!(handle.max_pages_reached());
    }

    #[test]
    fn max_pages_reached_is_false_when_unbounded() {
        let handle = test_handle();
        for _ in 0..1000 {
            handle.record_page_crawled();
        }
        assert!(!handle.max_pages_reached());
    }

    #[tokio::test]
    async fn touch_progress_resets_the_stall_clock() {
        let handle = test_handle();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.stalled_for().await >= Duration::from_millis(20));
        handle.touch_progress().await;
        assert!(handle.stalled_for().await < Duration::from_millis(20));
    }
}
