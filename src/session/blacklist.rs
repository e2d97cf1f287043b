//! Token blacklist: every access path consulting a session must check
//! this first; a hit always maps to `TokenRevoked`.
//!
//! Backed by the shared `DistributedStore` so revocation is visible to
//! every node within replication lag. A jti is written with TTL equal to
//! its remaining lifetime so blacklist entries expire naturally once the
//! token itself would have expired anyway.

use crate::store::{DistributedStore, StoreError};

pub struct TokenBlacklist {
    store: DistributedStore,
    namespace: String,
}

impl TokenBlacklist {
    #[must_use]
    pub fn new(store: DistributedStore, namespace: impl Into<String>) -> Self {
        Self { store, namespace: namespace.into() }
    }

    fn key(&self, jti: &str) -> String {
        format!("{}:blacklist:{jti}", self.namespace)
    }

    pub async fn revoke(&self, jti: &str, remaining_lifetime_secs: u64) -> Result<(), StoreError> {
        self.store.set_ex(&self.key(jti), b"1", remaining_lifetime_secs.max(1)).await
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        self.store.exists(&self.key(jti)).await
    }
}
