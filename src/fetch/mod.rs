//! Fetcher, plus the domain-health supporting cast: circuit breaker,
//! per-domain concurrency limiter, and HTTP-status content validation.

pub mod circuit_breaker;
pub mod content_validator;
pub mod domain_limiter;
pub mod fetcher;

pub use circuit_breaker::{CircuitBreaker, CircuitState, DomainHealth};
pub use content_validator::{validate_page_content, ContentValidationResult};
pub use domain_limiter::DomainLimiter;
pub use fetcher::{FetchOptions, FetchedPage, Fetcher};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("response body exceeded {0} bytes")]
    BodyTooLarge(u64),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open for domain: {0}")]
    CircuitOpen(String),
}

impl FetchError {
    /// Whether a retry is worth attempting. Content-type/body-shape
    /// failures are deterministic and retrying wastes a circuit-breaker
    /// attempt; transport errors are typically transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}
