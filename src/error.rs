//! Crate-wide error composition.
//!
//! Each component defines its own `thiserror` enum (see `fetch::FetchError`,
//! `session::token::TokenError`, ...); this module wires them into a single
//! top-level error for binary/test call sites, following a
//! Transient/Policy/Security/Programmer error taxonomy.

use thiserror::Error;

/// Top-level error type. Component errors convert into this via `From`,
/// but components themselves never depend on it — only the boundary does.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),

    #[error("robots error: {0}")]
    Robots(#[from] crate::robots::RobotsError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("dedup error: {0}")]
    Dedup(#[from] crate::dedup::DedupError),

    #[error("render error: {0}")]
    Render(#[from] crate::render::RenderError),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("session error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;
