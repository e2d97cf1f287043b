//! SimHash-64 over word features. Shingle-based similarity is covered
//! separately by `minhash`'s shingle extraction.

use xxhash_rust::xxh3::xxh3_64;

#[must_use]
pub fn simhash64(words: &[&str]) -> u64 {
    if words.is_empty() {
        return 0;
    }
    let mut bit_weights = [0i64; 64];
    for word in words {
        let h = xxh3_64(word.as_bytes());
        for (bit, weight) in bit_weights.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    let mut result: u64 = 0;
    for (bit, weight) in bit_weights.iter().enumerate() {
        if *weight > 0 {
            result |= 1 << bit;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(simhash64(&[]), 0);
    }

    #[test]
    fn same_words_same_hash() {
        let words = vec!["alpha", "beta", "gamma"];
        assert_eq!(simhash64(&words), simhash64(&words));
    }

    #[test]
    fn order_independent() {
        let a = vec!["alpha", "beta", "gamma"];
        let b = vec!["gamma", "alpha", "beta"];
        assert_eq!(simhash64(&a), simhash64(&b));
    }
}
