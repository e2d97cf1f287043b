//! Shared low-level utilities used across the crawl, cache, and session
//! components: string truncation, URL normalization, glob compilation,
//! and timeout wrapping.

pub mod glob;
pub mod string_utils;
pub mod timeout;
pub mod url_norm;

pub use glob::compile_glob_pattern;
pub use string_utils::{safe_truncate_boundary, safe_truncate_chars};
pub use timeout::with_timeout;
pub use url_norm::normalize_url;
