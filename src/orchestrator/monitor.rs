use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::job::{JobHandle, JobStatus};

const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Periodically checks queue+processing counters and terminates the job
/// on any of: empty queues and processing set, `max_pages` reached, 60s
/// without progress, or cancellation. `max_pages` reached and stalling are
/// termination conditions, not distinct externally-visible statuses: both
/// resolve onto the job's five-value status, the former as `Completed`
/// (the crawl did what it was asked), the latter as `Failed`.
pub fn spawn(handle: Arc<JobHandle>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(MONITOR_INTERVAL).await;

            if handle.is_cancelled() {
                return;
            }
            if handle.max_pages_reached() {
                handle.set_status(JobStatus::Completed);
                return;
            }
            if handle.stalled_for().await > STALL_TIMEOUT {
                handle.set_status(JobStatus::Failed);
                return;
            }

            let pending = handle.queue.total_pending().await.unwrap_or(u64::MAX);
            let processing = handle.queue.processing_count().await.unwrap_or(u64::MAX);
            if pending == 0 && processing == 0 {
                info!(job_id = %handle.id, "crawl queues drained, job complete");
                handle.set_status(JobStatus::Completed);
                return;
            }
        }
    });
}
