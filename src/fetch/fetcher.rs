//! HTTP fetch pipeline: redirect-chain-capped GET, content-type
//! allow-list, streaming body with a size cap, retry with exponential
//! backoff gated by the circuit breaker and domain limiter, and lightweight
//! HTML extraction (links, title, meta description).

use super::circuit_breaker::{extract_domain, CircuitBreaker};
use super::content_validator::validate_page_content;
use super::domain_limiter::DomainLimiter;
use super::FetchError;
use crate::imurl::ImUrl;
use crate::util::normalize_url;
use bytes::Bytes;
use futures_util::StreamExt;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

const ALLOWED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];
const MAX_REDIRECTS: u8 = 10;
const DEFAULT_MAX_BODY_BYTES: u64 = 25 * 1024 * 1024;
const RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_body_bytes: u64,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (compatible; crawler/1.0)".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub links: Vec<String>,
}

pub struct Fetcher {
    client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    domain_limiter: Arc<DomainLimiter>,
    options: FetchOptions,
}

impl Fetcher {
    #[must_use]
    pub fn new(
        circuit_breaker: Arc<CircuitBreaker>,
        domain_limiter: Arc<DomainLimiter>,
        options: FetchOptions,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS as usize))
            .timeout(options.timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            circuit_breaker,
            domain_limiter,
            options,
        })
    }

    /// Fetch and lightly parse a single URL, retrying transient failures
    /// with exponential backoff while the domain's circuit breaker remains
    /// closed or half-open.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let domain = extract_domain(url).map_err(FetchError::InvalidUrl)?;
        if !self.circuit_breaker.should_attempt(&domain) {
            return Err(FetchError::CircuitOpen(domain));
        }

        let _permit = self.domain_limiter.acquire(domain.clone()).await;

        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            match self.fetch_once(url).await {
                Ok(page) => {
                    self.circuit_breaker.record_success(&domain);
                    return Ok(page);
                }
                Err(e) if e.is_retryable() && attempt + 1 < RETRY_ATTEMPTS => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(url, attempt, error = %e, "fetch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    last_err = Some(e);
                }
                Err(e) => {
                    self.circuit_breaker.record_failure(&domain, &e.to_string());
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or(FetchError::Transport("retries exhausted".into())))
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_ascii_lowercase());

        if let Some(ct) = &content_type {
            if !ALLOWED_CONTENT_TYPES.iter().any(|allowed| ct == allowed) {
                return Err(FetchError::UnsupportedContentType(ct.clone()));
            }
        }

        let body = self.read_capped_body(resp).await?;

        let validation = validate_page_content(&body, "", &final_url, Some(status));
        if !validation.is_valid {
            return Err(FetchError::InvalidResponse(
                validation.reason.unwrap_or_default(),
            ));
        }

        let normalized_final = normalize_url(&final_url).unwrap_or(final_url.clone());
        let (title, meta_description, links) = extract_html(&body, &normalized_final);

        Ok(FetchedPage {
            final_url: normalized_final,
            status,
            content_type,
            body,
            title,
            meta_description,
            links,
        })
    }

    async fn read_capped_body(&self, resp: reqwest::Response) -> Result<String, FetchError> {
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk.map_err(|e| FetchError::Transport(e.to_string()))?;
            if buf.len() as u64 + chunk.len() as u64 > self.options.max_body_bytes {
                return Err(FetchError::BodyTooLarge(self.options.max_body_bytes));
            }
            buf.extend_from_slice(&chunk);
        }
        String::from_utf8(buf).map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }
}

/// Extract title, meta description, and absolute-resolved links from an
/// HTML document. Malformed fragments degrade to empty results rather than
/// failing the fetch, per scraper's tolerant-parsing design.
fn extract_html(html: &str, base_url: &str) -> (Option<String>, Option<String>, Vec<String>) {
    let doc = Html::parse_document(html);
    let base = ImUrl::parse(base_url).ok();

    let title_sel = Selector::parse("title").unwrap();
    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let meta_sel = Selector::parse(r#"meta[name="description" i]"#).unwrap();
    let meta_description = doc
        .select(&meta_sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string);

    let link_sel = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();
    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else { continue };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let resolved = match &base {
            Some(base) => base.join(href).ok().map(|u| u.to_string()),
            None => Some(href.to_string()),
        };
        if let Some(resolved) = resolved {
            if let Ok(normalized) = normalize_url(&resolved) {
                links.push(normalized);
            }
        }
    }
    links.dedup();
    (title, meta_description, links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_description_and_links() {
        let html = r#"<html><head><title> Example </title>
            <meta name="description" content="An example page">
            </head><body><a href="/a">A</a><a href="https://other.com/b">B</a>
            <a href="#frag">skip</a></body></html>"#;
        let (title, desc, links) = extract_html(html, "https://example.com/");
        assert_eq!(title.as_deref(), Some("Example"));
        assert_eq!(desc.as_deref(), Some("An example page"));
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l.contains("example.com/a")));
    }

    #[test]
    fn fragment_and_mailto_links_are_skipped() {
        let html = r#"<a href="#top">x</a><a href="mailto:a@b.com">y</a>"#;
        let (_, _, links) = extract_html(html, "https://example.com/");
        assert!(links.is_empty());
    }
}
