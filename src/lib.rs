//! Crawl/cache/session platform: a polite distributed crawler built on a
//! Redis-backed work queue and rate governor, a layered cache stack with
//! CDN-edge configuration and cross-node invalidation, and a JWT-based
//! session core with device binding.

pub mod bloom;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod governor;
pub mod imurl;
pub mod orchestrator;
pub mod queue;
pub mod render;
pub mod robots;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

pub use config::{AppConfig, AppConfigBuilder};
pub use error::{AppError, AppResult};
pub use imurl::ImUrl;
pub use orchestrator::{CrawlJob, JobConfig, JobHandle, JobStats, JobStatus, Orchestrator};
pub use store::DistributedStore;

/// Macro for handling streaming data chunks with safe unwrapping
#[macro_export]
macro_rules! on_chunk {
    ($closure:expr) => {
        move |chunk| match chunk {
            Ok(data) => $closure(data),
            Err(e) => {
                tracing::warn!(error = ?e, "chunk processing error");
            }
        }
    };
}

/// Macro for handling errors with safe unwrapping
#[macro_export]
macro_rules! on_error {
    ($closure:expr) => {
        move |error| match error {
            Some(e) => $closure(e),
            None => {
                tracing::error!("unknown error occurred in event handler");
            }
        }
    };
}
