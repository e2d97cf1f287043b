//! Robots and sitemap gateway: fetch/parse/cache robots.txt, answer
//! allow/disallow + crawl-delay queries, and walk declared sitemaps.

pub mod cache;
pub mod parser;
pub mod sitemap;

pub use parser::RobotsRules;
pub use sitemap::SitemapUrl;

use cache::RobotsCache;
use crate::store::DistributedStore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("failed to fetch robots.txt or sitemap: {0}")]
    Fetch(String),
    #[error("failed to parse document: {0}")]
    Parse(String),
}

pub struct RobotsGateway {
    client: reqwest::Client,
    cache: RobotsCache,
    user_agent: String,
}

impl RobotsGateway {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        store: Option<DistributedStore>,
        namespace: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cache: RobotsCache::new(store, namespace),
            user_agent: user_agent.into(),
        }
    }

    async fn rules_for_domain(&self, domain: &str) -> Result<std::sync::Arc<RobotsRules>, RobotsError> {
        if let Some(rules) = self.cache.get(domain).await? {
            return Ok(rules);
        }
        let url = format!("https://{domain}/robots.txt");
        let text = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.text().await.map_err(|e| RobotsError::Fetch(e.to_string()))?
            }
            // A missing or unreachable robots.txt means everything is
            // allowed (standard robots.txt semantics).
            _ => String::new(),
        };
        self.cache.put(domain, &text).await
    }

    /// Fetch/cache the domain's robots.txt, then test the path against
    /// the agent-selected rule set.
    pub async fn is_allowed(&self, domain: &str, path: &str) -> Result<bool, RobotsError> {
        let rules = self.rules_for_domain(domain).await?;
        Ok(rules.is_allowed(&self.user_agent, path))
    }

    /// `crawl_delay(domain)`: seconds/request override, if declared, for
    /// feeding into `governor::effective_rps`.
    pub async fn crawl_delay(&self, domain: &str) -> Result<Option<f64>, RobotsError> {
        let rules = self.rules_for_domain(domain).await?;
        Ok(rules.rules_for(&self.user_agent).crawl_delay)
    }

    /// Declared sitemap URLs for a domain, falling back to the
    /// conventional `/sitemap.xml` location when robots.txt names none.
    pub async fn sitemap_urls(&self, domain: &str) -> Result<Vec<String>, RobotsError> {
        let rules = self.rules_for_domain(domain).await?;
        if rules.sitemaps.is_empty() {
            Ok(vec![format!("https://{domain}/sitemap.xml")])
        } else {
            Ok(rules.sitemaps.clone())
        }
    }

    /// Walk every declared sitemap (recursively, through nested indexes)
    /// and return the flattened URL set.
    pub async fn discover_urls(&self, domain: &str) -> Result<Vec<SitemapUrl>, RobotsError> {
        let mut all = Vec::new();
        for sitemap_url in self.sitemap_urls(domain).await? {
            if let Ok(mut urls) = sitemap::fetch_and_parse(&self.client, &sitemap_url).await {
                all.append(&mut urls);
            }
        }
        Ok(all)
    }
}
