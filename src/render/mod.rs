//! Renderer pool: pre-warmed Chrome instances with dynamic scaling, plus
//! the per-page rendering pipeline (wait strategies, AJAX quiescence
//! detection, resource blocking, stealth injection).
//!
//! Browser launch, profile-directory management, and stealth injection
//! all live here as one self-contained module rather than split across
//! separate setup/profile/stealth modules.

pub mod page;

pub use page::{AjaxReport, RenderOptions, RenderedPage, WaitStrategy};

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CHROME_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("renderer pool exhausted (max_pool_size reached)")]
    PoolExhausted,
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub oldest_browser_age: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub keepalive_interval: Duration,
    pub idle_timeout: Duration,
    pub headless: bool,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 2,
            max_pool_size: 10,
            keepalive_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            headless: true,
        }
    }
}

#[derive(Debug)]
pub struct PooledBrowserWrapper {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    profile_dir: Option<PathBuf>,
}

impl PooledBrowserWrapper {
    fn new(browser: Browser, handler: JoinHandle<()>, profile_dir: PathBuf) -> Self {
        Self {
            browser: Arc::new(browser),
            handler,
            profile_dir: Some(profile_dir),
        }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn browser_arc(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    fn browser_mut(&mut self) -> Option<&mut Browser> {
        Arc::get_mut(&mut self.browser)
    }

    fn cleanup_profile_dir(&mut self) {
        if let Some(path) = self.profile_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("failed to clean up profile dir {}: {e}", path.display());
            }
        }
    }
}

impl Drop for PooledBrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        self.cleanup_profile_dir();
    }
}

#[derive(Debug)]
struct PooledBrowser {
    id: u64,
    wrapper: PooledBrowserWrapper,
    created_at: Instant,
    last_used: Instant,
}

impl PooledBrowser {
    fn new(id: u64, wrapper: PooledBrowserWrapper) -> Self {
        let now = Instant::now();
        Self {
            id,
            wrapper,
            created_at: now,
            last_used: now,
        }
    }
}

/// Pre-warmed browser pool. Target size is `max(in_use + 2, min_pool_size)`,
/// capped at `max_pool_size`.
pub struct BrowserPool {
    config: BrowserPoolConfig,
    available: Arc<Mutex<VecDeque<PooledBrowser>>>,
    in_use_count: AtomicUsize,
    next_id: AtomicU64,
    scaler_handle: Mutex<Option<JoinHandle<()>>>,
    keepalive_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl BrowserPool {
    #[must_use]
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            in_use_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            scaler_handle: Mutex::new(None),
            keepalive_handle: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!(?self.config.min_pool_size, ?self.config.max_pool_size, "starting renderer pool");
        self.scale_to_target().await?;

        let pool = Arc::clone(self);
        *self.scaler_handle.lock().await = Some(tokio::spawn(scaler_loop(pool)));

        let pool = Arc::clone(self);
        *self.keepalive_handle.lock().await = Some(tokio::spawn(keepalive_loop(pool)));

        Ok(())
    }

    pub async fn acquire(self: &Arc<Self>) -> Result<PooledBrowserGuard, RenderError> {
        loop {
            let mut available = self.available.lock().await;
            if let Some(mut browser) = available.pop_front() {
                match browser.wrapper.browser().version().await {
                    Ok(_) => {
                        browser.last_used = Instant::now();
                        self.in_use_count.fetch_add(1, Ordering::Relaxed);
                        return Ok(PooledBrowserGuard {
                            browser: Some(browser),
                            pool: Arc::clone(self),
                        });
                    }
                    Err(e) => {
                        warn!(browser_id = browser.id, error = %e, "pooled browser failed health check");
                        continue;
                    }
                }
            }
            drop(available);

            let total = self.in_use_count.load(Ordering::Relaxed) + self.available.lock().await.len();
            if total < self.config.max_pool_size {
                let browser = self
                    .launch_one()
                    .await
                    .map_err(|e| RenderError::Launch(e.to_string()))?;
                self.in_use_count.fetch_add(1, Ordering::Relaxed);
                return Ok(PooledBrowserGuard {
                    browser: Some(browser),
                    pool: Arc::clone(self),
                });
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn release(&self, mut browser: PooledBrowser) {
        self.in_use_count.fetch_sub(1, Ordering::Relaxed);
        browser.last_used = Instant::now();
        let available = Arc::clone(&self.available);
        tokio::spawn(async move {
            available.lock().await.push_back(browser);
        });
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.scaler_handle.lock().await.take() {
            h.abort();
        }
        if let Some(h) = self.keepalive_handle.lock().await.take() {
            h.abort();
        }
        let mut available = self.available.lock().await;
        while let Some(mut browser) = available.pop_front() {
            if let Some(b) = browser.wrapper.browser_mut() {
                let _ = b.close().await;
                let _ = b.wait().await;
            }
            browser.wrapper.cleanup_profile_dir();
        }
        Ok(())
    }

    /// Snapshot of pool occupancy, surfaced by the orchestrator's metrics
    /// endpoint.
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        PoolStats {
            available: available.len(),
            in_use: self.in_use_count.load(Ordering::Relaxed),
            oldest_browser_age: available
                .iter()
                .map(|b| b.created_at.elapsed())
                .max()
                .unwrap_or_default(),
        }
    }

    fn target_pool_size(&self) -> usize {
        let in_use = self.in_use_count.load(Ordering::Relaxed);
        (in_use + 2).max(self.config.min_pool_size).min(self.config.max_pool_size)
    }

    async fn scale_to_target(&self) -> Result<()> {
        let target = self.target_pool_size();
        let current = self.available.lock().await.len();
        if current >= target {
            return Ok(());
        }
        let to_launch = target - current;
        let futs: Vec<_> = (0..to_launch).map(|_| self.launch_one()).collect();
        let results = futures::future::join_all(futs).await;
        let mut available = self.available.lock().await;
        for result in results {
            match result {
                Ok(browser) => available.push_back(browser),
                Err(e) => warn!("failed to launch browser for pool: {e}"),
            }
        }
        Ok(())
    }

    async fn launch_one(&self) -> Result<PooledBrowser> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let profile_dir = std::env::temp_dir().join(format!(
            "crawler_chrome_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&profile_dir).context("failed to create browser profile dir")?;

        let mut config_builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .window_size(1920, 1080)
            .user_data_dir(profile_dir.clone());

        config_builder = if self.config.headless {
            config_builder.headless_mode(HeadlessMode::default())
        } else {
            config_builder.with_head()
        };

        config_builder = config_builder
            .arg(format!("--user-agent={CHROME_USER_AGENT}"))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-notifications")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--mute-audio")
            .arg("--hide-scrollbars");

        let browser_config = config_builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    debug!("browser handler event error: {e}");
                }
            }
        });

        let wrapper = PooledBrowserWrapper::new(browser, handler_task, profile_dir);
        Ok(PooledBrowser::new(id, wrapper))
    }
}

pub struct PooledBrowserGuard {
    browser: Option<PooledBrowser>,
    pool: Arc<BrowserPool>,
}

impl PooledBrowserGuard {
    pub fn browser(&self) -> &Browser {
        self.browser.as_ref().expect("browser present while guard alive").wrapper.browser()
    }

    pub fn browser_arc(&self) -> Arc<Browser> {
        self.browser
            .as_ref()
            .expect("browser present while guard alive")
            .wrapper
            .browser_arc()
    }

    pub fn id(&self) -> u64 {
        self.browser.as_ref().expect("browser present while guard alive").id
    }
}

impl Drop for PooledBrowserGuard {
    fn drop(&mut self) {
        if let Some(browser) = self.browser.take() {
            self.pool.release(browser);
        }
    }
}

async fn scaler_loop(pool: Arc<BrowserPool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    while !pool.shutdown.load(Ordering::Relaxed) {
        interval.tick().await;
        if let Err(e) = pool.scale_to_target().await {
            warn!("renderer pool scaler error: {e}");
        }

        let mut available = pool.available.lock().await;
        let now = Instant::now();
        while available.len() > pool.config.min_pool_size {
            let Some(front) = available.front() else { break };
            if now.duration_since(front.last_used) > pool.config.idle_timeout {
                available.pop_front();
            } else {
                break;
            }
        }
    }
}

async fn keepalive_loop(pool: Arc<BrowserPool>) {
    let mut interval = tokio::time::interval(pool.config.keepalive_interval);
    while !pool.shutdown.load(Ordering::Relaxed) {
        interval.tick().await;
        let mut available = pool.available.lock().await;
        let mut healthy = VecDeque::new();
        while let Some(browser) = available.pop_front() {
            if browser.wrapper.browser().version().await.is_ok() {
                healthy.push_back(browser);
            } else {
                warn!(browser_id = browser.id, "pooled browser failed keepalive check");
            }
        }
        *available = healthy;
    }
}
