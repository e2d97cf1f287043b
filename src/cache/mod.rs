//! Cache stack: in-process Application Cache, the Distributed Cache over
//! the shared KV, declarative Edge Cache config, the layered Cache
//! Manager, and the rule-driven Invalidator.

pub mod app;
pub mod distributed;
pub mod edge;
pub mod invalidator;
pub mod manager;

pub use app::{ApplicationCache, EvictionPolicy};
pub use distributed::DistributedCache;
pub use edge::{CacheRule, EdgeCacheConfig};
pub use invalidator::{CacheInvalidator, InvalidationRule};
pub use manager::{CacheLayer, CacheManager};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("value of {size} bytes exceeds cache capacity")]
    TooLarge { size: usize },
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error("serialization error: {0}")]
    Serialization(String),
}
