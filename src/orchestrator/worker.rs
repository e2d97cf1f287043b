use crate::fetch::Fetcher;
use crate::robots::RobotsGateway;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use super::job::CallbackFn;
use super::job::{JobHandle, JobStatus};

const LEASE_POLL: Duration = Duration::from_secs(2);

/// Spawn a worker pool sized roughly to CPU count, each worker running
/// `concurrent_crawls_per_worker` cooperative fetch loops.
pub fn spawn_pool(handle: Arc<JobHandle>, fetcher: Arc<Fetcher>, robots: Arc<RobotsGateway>) {
    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    for worker_id in 0..worker_count {
        for task_id in 0..handle.config.concurrent_crawls_per_worker {
            let handle = handle.clone();
            let fetcher = fetcher.clone();
            let robots = robots.clone();
            tokio::spawn(async move {
                fetch_loop(handle, fetcher, robots, worker_id, task_id).await;
            });
        }
    }
}

async fn fetch_loop(
    handle: Arc<JobHandle>,
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsGateway>,
    worker_id: usize,
    task_id: usize,
) {
    loop {
        if handle.is_cancelled() || handle.max_pages_reached() {
            return;
        }

        let entry = match handle.queue.lease(LEASE_POLL).await {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(err) => {
                warn!(worker_id, task_id, %err, "lease failed");
                tokio::time::sleep(LEASE_POLL).await;
                continue;
            }
        };

        let Some(domain) = entry.domain() else {
            let _ = handle.queue.fail(entry, "unparseable url").await;
            continue;
        };

        let path = url_path(&entry.url);
        match robots.is_allowed(&domain, &path).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = handle.queue.complete(&entry).await;
                continue;
            }
            Err(err) => {
                let _ = handle.queue.fail(entry, &err.to_string()).await;
                continue;
            }
        }

        match fetcher.fetch(&entry.url).await {
            Ok(page) => {
                let verdict = handle.dedup.check(&page.body, &page.final_url, None);
                match verdict {
                    Ok(v) if v.should_reject(&crate::dedup::DedupPolicy::default()) => {
                        debug!(url = %entry.url, ?v, "duplicate content rejected");
                    }
                    _ => {
                        if let Some(callback) = &handle.callback {
                            callback(&entry.url, &page.body);
                        }
                    }
                }
                handle.record_page_crawled();
                handle.touch_progress().await;
                let _ = handle.queue.complete(&entry).await;
                if handle.status() == JobStatus::Pending {
                    handle.set_status(JobStatus::Running);
                }
            }
            Err(err) => {
                let _ = handle.queue.fail(entry, &err.to_string()).await;
            }
        }
    }
}

fn url_path(raw: &str) -> String {
    url::Url::parse(raw)
        .map(|u| {
            let mut path = u.path().to_string();
            if let Some(query) = u.query() {
                path.push('?');
                path.push_str(query);
            }
            path
        })
        .unwrap_or_else(|_| "/".to_string())
}
