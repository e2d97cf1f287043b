//! Crawl orchestrator and worker pool: job lifecycle, sitemap seeding,
//! and a worker pool that drains the priority queue through fetch,
//! optional render, fingerprint, and dedup.
//!
//! The crawl loop itself (a queue drained by a worker pool with periodic
//! progress reporting) is generalized from single-page crawls to
//! job-scoped multi-worker crawls, with termination conditions (empty
//! queues, `max_pages`, stall timeout, cancellation) handled by the
//! monitor loop.

mod job;
mod monitor;
pub mod progress;
mod worker;

pub use job::{CrawlJob, JobConfig, JobHandle, JobStats, JobStatus};
pub use worker::CallbackFn;

use crate::dedup::{DedupEngine, DedupPolicy};
use crate::fetch::Fetcher;
use crate::queue::PriorityQueue;
use crate::robots::RobotsGateway;
use crate::store::DistributedStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),
    #[error("robots error: {0}")]
    Robots(#[from] crate::robots::RobotsError),
}

pub struct Orchestrator {
    store: DistributedStore,
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsGateway>,
    jobs: RwLock<std::collections::HashMap<String, Arc<JobHandle>>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(store: DistributedStore, fetcher: Arc<Fetcher>, robots: Arc<RobotsGateway>) -> Self {
        Self { store, fetcher, robots, jobs: RwLock::new(std::collections::HashMap::new()) }
    }

    pub async fn create_job(&self, config: JobConfig, callback: Option<worker::CallbackFn>) -> String {
        let job_id = Uuid::new_v4().to_string();
        let namespace = format!("job:{job_id}");
        let queue = Arc::new(PriorityQueue::new(
            self.store.clone(),
            Arc::new(crate::bloom::BloomDeduper::new(1_000_000, 0.01)),
            Arc::new(crate::governor::TokenBucketGovernor::new(
                config.default_rps,
                config.default_burst,
            )),
            namespace,
            config.max_depth,
        ));
        let dedup = Arc::new(DedupEngine::new(DedupPolicy::default()));
        let mut handle = JobHandle::new(job_id.clone(), config, queue, dedup);
        if let Some(callback) = callback {
            handle = handle.with_callback(callback);
        }
        self.jobs.write().await.insert(job_id.clone(), Arc::new(handle));
        job_id
    }

    pub async fn start_job(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let handle = self.job(job_id).await?;
        job::seed(&handle, &self.robots).await?;
        worker::spawn_pool(handle.clone(), self.fetcher.clone(), self.robots.clone());
        monitor::spawn(handle);
        Ok(())
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let handle = self.job(job_id).await?;
        handle.cancel();
        Ok(())
    }

    pub async fn stats(&self, job_id: &str) -> Result<JobStats, OrchestratorError> {
        let handle = self.job(job_id).await?;
        Ok(handle.stats().await)
    }

    async fn job(&self, job_id: &str) -> Result<Arc<JobHandle>, OrchestratorError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))
    }
}
