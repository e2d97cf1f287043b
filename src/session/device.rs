//! Device fingerprint binding: sorts a fixed component set and SHA-256
//! hashes a deterministic `key=value` join, relying on `BTreeMap` for
//! canonical ordering instead of a JSON library.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonical subset of client hints a fingerprint is computed over,
/// matching the Python original's `fingerprint_components` list.
const FINGERPRINT_COMPONENTS: &[&str] =
    &["accept_encoding", "accept_language", "color_depth", "screen_resolution", "timezone", "user_agent"];

#[must_use]
pub fn generate_fingerprint(hints: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for component in FINGERPRINT_COMPONENTS {
        if let Some(value) = hints.get(*component) {
            hasher.update(component.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b";");
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_hints_produce_same_fingerprint() {
        let mut hints = BTreeMap::new();
        hints.insert("user_agent".to_string(), "Mozilla/5.0".to_string());
        hints.insert("timezone".to_string(), "UTC".to_string());
        assert_eq!(generate_fingerprint(&hints), generate_fingerprint(&hints));
    }

    #[test]
    fn different_user_agent_changes_fingerprint() {
        let mut a = BTreeMap::new();
        a.insert("user_agent".to_string(), "Mozilla/5.0".to_string());
        let mut b = BTreeMap::new();
        b.insert("user_agent".to_string(), "Chrome/120".to_string());
        assert_ne!(generate_fingerprint(&a), generate_fingerprint(&b));
    }

    #[test]
    fn component_insertion_order_does_not_matter() {
        let mut a = BTreeMap::new();
        a.insert("user_agent".to_string(), "X".to_string());
        a.insert("timezone".to_string(), "UTC".to_string());
        let mut b = BTreeMap::new();
        b.insert("timezone".to_string(), "UTC".to_string());
        b.insert("user_agent".to_string(), "X".to_string());
        assert_eq!(generate_fingerprint(&a), generate_fingerprint(&b));
    }
}
