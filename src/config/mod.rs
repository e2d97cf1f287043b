//! Ambient service configuration: secret key, token lifetimes, rate-limit
//! knobs, cache sizes/TTLs, namespace prefix, and blacklist TTL bounds.
//!
//! Built as a `PhantomData`-based typestate builder with compile-time
//! enforcement of required fields, scoped to this crate's actual
//! environment surface — no storage-dir/screenshot/markdown fields, since
//! those belong to a different kind of crawl output entirely.

use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use std::time::Duration;

pub struct Missing;
pub struct Present;

pub struct AppConfigBuilder<Secret = Missing, Redis = Missing> {
    secret_key: Option<String>,
    redis_url: Option<String>,
    namespace: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    max_sessions_per_user: usize,
    application_cache_max_bytes: usize,
    application_cache_max_entries: usize,
    distributed_cache_default_ttl: Duration,
    blacklist_ttl_min: Duration,
    blacklist_ttl_max: Duration,
    user_agent: String,
    default_rate_limit_rps: f64,
    _secret: PhantomData<Secret>,
    _redis: PhantomData<Redis>,
}

impl Default for AppConfigBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            secret_key: None,
            redis_url: None,
            namespace: "crawl".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(14 * 24 * 60 * 60),
            max_sessions_per_user: 10,
            application_cache_max_bytes: 1024 * 1024 * 1024,
            application_cache_max_entries: 100_000,
            distributed_cache_default_ttl: Duration::from_secs(3600),
            blacklist_ttl_min: Duration::from_secs(60),
            blacklist_ttl_max: Duration::from_secs(14 * 24 * 60 * 60),
            user_agent: "CrawlBot/1.0 (+https://example.invalid/bot)".to_string(),
            default_rate_limit_rps: 1.0,
            _secret: PhantomData,
            _redis: PhantomData,
        }
    }
}

impl<Secret, Redis> AppConfigBuilder<Secret, Redis> {
    #[must_use]
    pub fn secret_key(self, secret_key: impl Into<String>) -> AppConfigBuilder<Present, Redis> {
        AppConfigBuilder {
            secret_key: Some(secret_key.into()),
            redis_url: self.redis_url,
            namespace: self.namespace,
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
            max_sessions_per_user: self.max_sessions_per_user,
            application_cache_max_bytes: self.application_cache_max_bytes,
            application_cache_max_entries: self.application_cache_max_entries,
            distributed_cache_default_ttl: self.distributed_cache_default_ttl,
            blacklist_ttl_min: self.blacklist_ttl_min,
            blacklist_ttl_max: self.blacklist_ttl_max,
            user_agent: self.user_agent,
            default_rate_limit_rps: self.default_rate_limit_rps,
            _secret: PhantomData,
            _redis: PhantomData,
        }
    }

    #[must_use]
    pub fn redis_url(self, redis_url: impl Into<String>) -> AppConfigBuilder<Secret, Present> {
        AppConfigBuilder {
            secret_key: self.secret_key,
            redis_url: Some(redis_url.into()),
            namespace: self.namespace,
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
            max_sessions_per_user: self.max_sessions_per_user,
            application_cache_max_bytes: self.application_cache_max_bytes,
            application_cache_max_entries: self.application_cache_max_entries,
            distributed_cache_default_ttl: self.distributed_cache_default_ttl,
            blacklist_ttl_min: self.blacklist_ttl_min,
            blacklist_ttl_max: self.blacklist_ttl_max,
            user_agent: self.user_agent,
            default_rate_limit_rps: self.default_rate_limit_rps,
            _secret: PhantomData,
            _redis: PhantomData,
        }
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn token_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_ttl = access;
        self.refresh_token_ttl = refresh;
        self
    }

    #[must_use]
    pub fn max_sessions_per_user(mut self, max: usize) -> Self {
        self.max_sessions_per_user = max;
        self
    }

    #[must_use]
    pub fn application_cache_capacity(mut self, max_bytes: usize, max_entries: usize) -> Self {
        self.application_cache_max_bytes = max_bytes;
        self.application_cache_max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn distributed_cache_default_ttl(mut self, ttl: Duration) -> Self {
        self.distributed_cache_default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn blacklist_ttl_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.blacklist_ttl_min = min;
        self.blacklist_ttl_max = max;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn default_rate_limit_rps(mut self, rps: f64) -> Self {
        self.default_rate_limit_rps = rps;
        self
    }
}

impl AppConfigBuilder<Present, Present> {
    pub fn build(self) -> Result<AppConfig> {
        let secret_key = self.secret_key.ok_or_else(|| anyhow!("secret_key is required"))?;
        if secret_key.len() < 32 {
            return Err(anyhow!("secret_key must be at least 32 bytes"));
        }
        let redis_url = self.redis_url.ok_or_else(|| anyhow!("redis_url is required"))?;
        if self.blacklist_ttl_min > self.blacklist_ttl_max {
            return Err(anyhow!("blacklist_ttl_min must not exceed blacklist_ttl_max"));
        }
        Ok(AppConfig {
            secret_key,
            redis_url,
            namespace: self.namespace,
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
            max_sessions_per_user: self.max_sessions_per_user,
            application_cache_max_bytes: self.application_cache_max_bytes,
            application_cache_max_entries: self.application_cache_max_entries,
            distributed_cache_default_ttl: self.distributed_cache_default_ttl,
            blacklist_ttl_min: self.blacklist_ttl_min,
            blacklist_ttl_max: self.blacklist_ttl_max,
            user_agent: self.user_agent,
            default_rate_limit_rps: self.default_rate_limit_rps,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub secret_key: String,
    pub redis_url: String,
    pub namespace: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub max_sessions_per_user: usize,
    pub application_cache_max_bytes: usize,
    pub application_cache_max_entries: usize,
    pub distributed_cache_default_ttl: Duration,
    pub blacklist_ttl_min: Duration,
    pub blacklist_ttl_max: Duration,
    pub user_agent: String,
    pub default_rate_limit_rps: f64,
}

impl AppConfig {
    /// Load from environment variables. `CRAWL_SECRET_KEY` is required;
    /// everything else falls back to sensible defaults.
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("CRAWL_SECRET_KEY").map_err(|_| anyhow!("CRAWL_SECRET_KEY is not set"))?;
        let redis_url = std::env::var("CRAWL_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let mut builder = AppConfigBuilder::default().secret_key(secret_key).redis_url(redis_url);

        if let Ok(namespace) = std::env::var("CRAWL_NAMESPACE") {
            builder = builder.namespace(namespace);
        }
        if let Ok(rps) = std::env::var("CRAWL_DEFAULT_RATE_LIMIT_RPS") {
            if let Ok(rps) = rps.parse() {
                builder = builder.default_rate_limit_rps(rps);
            }
        }
        if let Ok(max) = std::env::var("CRAWL_MAX_SESSIONS_PER_USER") {
            if let Ok(max) = max.parse() {
                builder = builder.max_sessions_per_user(max);
            }
        }
        if let Ok(agent) = std::env::var("CRAWL_USER_AGENT") {
            builder = builder.user_agent(agent);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_both_secret_and_redis() {
        let config =
            AppConfigBuilder::default().secret_key("a".repeat(32)).redis_url("redis://localhost:6379").build().unwrap();
        assert_eq!(config.namespace, "crawl");
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = AppConfigBuilder::default().secret_key("short").redis_url("redis://localhost:6379").build();
        assert!(result.is_err());
    }

    #[test]
    fn blacklist_bounds_must_be_ordered() {
        let builder = AppConfigBuilder::default()
            .secret_key("a".repeat(32))
            .redis_url("redis://localhost:6379")
            .blacklist_ttl_bounds(Duration::from_secs(100), Duration::from_secs(10));
        assert!(builder.build().is_err());
    }
}
