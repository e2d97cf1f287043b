//! Distributed cache: namespaced values over the shared KV,
//! gzip-compressed above 1 KB. Values are `rmp-serde` msgpack-encoded, a
//! compact binary serializer in place of JSON for internal cache
//! traffic.

use crate::cache::CacheError;
use crate::store::DistributedStore;
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Read;

const GZIP_THRESHOLD_BYTES: usize = 1024;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub struct DistributedCache {
    store: DistributedStore,
    namespace: String,
}

impl DistributedCache {
    #[must_use]
    pub fn new(store: DistributedStore, namespace: impl Into<String>) -> Self {
        Self { store, namespace: namespace.into() }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
        let packed = rmp_serde::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        if packed.len() > GZIP_THRESHOLD_BYTES {
            let mut encoder = GzEncoder::new(packed.as_slice(), Compression::default());
            let mut out = Vec::new();
            encoder.read_to_end(&mut out).map_err(|e| CacheError::Serialization(e.to_string()))?;
            Ok(out)
        } else {
            Ok(packed)
        }
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
        let raw = if bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| CacheError::Serialization(e.to_string()))?;
            out
        } else {
            bytes.to_vec()
        };
        rmp_serde::from_slice(&raw).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(&self.namespaced(key)).await? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<(), CacheError> {
        let encoded = Self::encode(value)?;
        self.store.set_ex(&self.namespaced(key), &encoded, ttl_secs).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.delete(&self.namespaced(key)).await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.exists(&self.namespaced(key)).await?)
    }

    pub async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        Ok(self.store.ttl(&self.namespaced(key)).await?)
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<bool, CacheError> {
        Ok(self.store.expire(&self.namespaced(key), ttl_secs).await?)
    }

    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>, CacheError> {
        let namespaced: Vec<String> = keys.iter().map(|k| self.namespaced(k)).collect();
        let raw = self.store.mget(&namespaced).await?;
        raw.into_iter()
            .map(|entry| entry.map(|bytes| Self::decode(&bytes)).transpose())
            .collect()
    }

    /// `mset` with per-key TTL; not server-atomic since the shared store
    /// exposes no MSET-with-expiry primitive — a documented non-atomic
    /// fallback issuing one `SETEX` per key.
    pub async fn mset<T: Serialize>(&self, entries: &[(String, T, u64)]) -> Result<(), CacheError> {
        for (key, value, ttl) in entries {
            self.set(key, value, *ttl).await?;
        }
        Ok(())
    }

    pub async fn incr(&self, key: &str, amount: i64, ttl_secs: u64) -> Result<i64, CacheError> {
        Ok(self.store.incr_with_ttl(&self.namespaced(key), amount, ttl_secs).await?)
    }

    pub async fn get_extend_ttl<T: DeserializeOwned>(
        &self,
        key: &str,
        extend_by_secs: i64,
    ) -> Result<Option<T>, CacheError> {
        let namespaced = self.namespaced(key);
        let value = self.store.get(&namespaced).await?;
        if value.is_some() {
            self.store.expire(&namespaced, extend_by_secs).await?;
        }
        value.map(|bytes| Self::decode(&bytes)).transpose()
    }

    /// Iterate the keyspace under this namespace matching `pattern` and
    /// delete each match.
    pub async fn clear(&self, pattern: &str) -> Result<usize, CacheError> {
        let full_pattern = self.namespaced(pattern);
        let keys = self.store.scan_match(&full_pattern).await?;
        let mut cleared = 0;
        for key in keys {
            if self.store.delete(&key).await? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_round_trip_without_gzip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Small {
            a: u32,
        }
        let value = Small { a: 7 };
        let encoded = DistributedCache::encode(&value).unwrap();
        assert_ne!(encoded[..2.min(encoded.len())], GZIP_MAGIC);
        let decoded: Small = DistributedCache::decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn large_values_round_trip_with_gzip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Large {
            text: String,
        }
        let value = Large { text: "x".repeat(4096) };
        let encoded = DistributedCache::encode(&value).unwrap();
        assert_eq!(&encoded[..2], &GZIP_MAGIC);
        let decoded: Large = DistributedCache::decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }
}
