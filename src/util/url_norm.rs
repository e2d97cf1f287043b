//! URL normalization for the queue-entry identity invariant: normalized
//! form is lowercase-host, fragment-stripped, query params
//! lexicographically sorted; two inputs yielding the same normalized
//! form are the same queue entry.
//!
//! Normalization must be idempotent — two invocations of `enqueue` on
//! differently-formed but equivalent URLs must collapse to
//! `AlreadySeen`.

use crate::imurl::ImUrl;
use anyhow::Result;

/// Normalize a URL string to its canonical crawl-queue form.
///
/// - host is lowercased (the `url` crate already lowercases host on parse)
/// - fragment is stripped
/// - query parameters are sorted lexicographically by `key=value` pair
///
/// Returns the normalized URL as a string; two equivalent inputs always
/// produce byte-identical output.
pub fn normalize_url(input: &str) -> Result<String> {
    let parsed = ImUrl::parse(input)?;
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_unstable();

    let without_fragment = parsed.without_fragment()?;
    if pairs.is_empty() {
        return Ok(strip_empty_query(without_fragment.as_str()));
    }

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let renormalized = without_fragment.with_query(&query)?;
    Ok(renormalized.as_str().to_string())
}

/// `url::Url::set_query(None)` leaves no `?`, but some inputs arrive with a
/// trailing `?` and no pairs; strip it for a clean canonical form.
fn strip_empty_query(s: &str) -> String {
    s.trim_end_matches('?').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment() {
        let a = normalize_url("https://Example.com/page#section").unwrap();
        let b = normalize_url("https://example.com/page").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn lowercases_host() {
        let n = normalize_url("https://EXAMPLE.com/Path").unwrap();
        assert!(n.starts_with("https://example.com/"));
        // path case is preserved, only host is lowercased
        assert!(n.contains("/Path"));
    }

    #[test]
    fn sorts_query_params() {
        let a = normalize_url("https://example.com/p?b=2&a=1").unwrap();
        let b = normalize_url("https://example.com/p?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn idempotent() {
        let once = normalize_url("https://example.com/p?b=2&a=1#frag").unwrap();
        let twice = normalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }
}
