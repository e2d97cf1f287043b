//! UTF-8-safe string truncation utilities.
//!
//! Respects UTF-8 character boundaries so multi-byte characters (emoji,
//! box-drawing symbols) never cause a panic on slicing.

/// Truncate a string to at most `max_chars` Unicode characters (not bytes).
#[inline]
#[must_use]
pub fn safe_truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        None => s,
        Some((byte_idx, _)) => &s[..byte_idx],
    }
}

/// Find a safe byte index for truncation, preferring the last word boundary
/// within the first `max_chars` characters.
#[must_use]
pub fn safe_truncate_boundary(s: &str, max_chars: usize, boundary_chars: &str) -> usize {
    let max_byte_idx = s
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());

    s[..max_byte_idx]
        .rfind(|c: char| c.is_whitespace() || boundary_chars.contains(c))
        .unwrap_or(max_byte_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(safe_truncate_chars("Hello, World!", 5), "Hello");
        assert_eq!(safe_truncate_chars("Hi", 100), "Hi");
    }

    #[test]
    fn truncate_boundary_prefers_whitespace() {
        let text = "Hello, wonderful world of Unicode!";
        let idx = safe_truncate_boundary(text, 20, " ,;:");
        assert_eq!(&text[..idx], "Hello, wonderful");
    }
}
