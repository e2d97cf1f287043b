//! Property tests for URL normalization invariants: idempotence and
//! query-parameter order independence.

use crawlsentry::util::normalize_url;
use proptest::prelude::*;

fn path_segment() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn query_pairs() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z]{1,5}", "[a-z0-9]{1,5}"), 0..5)
}

proptest! {
    #[test]
    fn normalization_is_idempotent(segment in path_segment(), pairs in query_pairs()) {
        let query = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        let url = if query.is_empty() {
            format!("https://example.com/{segment}")
        } else {
            format!("https://example.com/{segment}?{query}")
        };
        let once = normalize_url(&url).unwrap();
        let twice = normalize_url(&once).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn query_param_order_does_not_affect_normalized_form(segment in path_segment(), pairs in query_pairs()) {
        prop_assume!(!pairs.is_empty());
        let forward = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();
        let backward = reversed_pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");

        let a = normalize_url(&format!("https://example.com/{segment}?{forward}")).unwrap();
        let b = normalize_url(&format!("https://example.com/{segment}?{backward}")).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn host_case_never_affects_normalized_form(segment in path_segment()) {
        let lower = normalize_url(&format!("https://example.com/{segment}")).unwrap();
        let upper = normalize_url(&format!("https://EXAMPLE.COM/{segment}")).unwrap();
        prop_assert_eq!(lower, upper);
    }
}
