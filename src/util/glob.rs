//! Glob-pattern-to-regex compilation, shared by robots.txt path matching,
//! cache key pattern invalidation, and crawl job include/exclude
//! patterns.

use anyhow::{anyhow, Result};
use regex::Regex;

/// Compile a glob pattern (`*` = any sequence) into an anchored regex.
///
/// Regex metacharacters in the pattern are escaped first so that `*` is the
/// only special character, matching the semantics of robots.txt wildcards
/// and cache key globs.
pub fn compile_glob_pattern(pattern: &str) -> Result<Regex> {
    let mut regex_pattern = String::with_capacity(pattern.len() + 8);
    for segment in pattern.split('*') {
        if !regex_pattern.is_empty() {
            regex_pattern.push_str(".*");
        }
        regex_pattern.push_str(&regex::escape(segment));
    }
    let anchored = format!("^{regex_pattern}$");
    Regex::new(&anchored).map_err(|e| anyhow!("invalid glob pattern '{pattern}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_sequence() {
        let re = compile_glob_pattern("user:*:profile").unwrap();
        assert!(re.is_match("user:42:profile"));
        assert!(!re.is_match("user:42:settings"));
    }

    #[test]
    fn literal_dots_are_escaped() {
        let re = compile_glob_pattern("*.example.com/*").unwrap();
        assert!(re.is_match("foo.example.com/bar"));
        assert!(!re.is_match("fooXexampleYcom/bar"));
    }
}
