//! End-to-end fetch pipeline tests against a mock HTTP server.

use crawlsentry::fetch::{CircuitBreaker, DomainLimiter, FetchError, FetchOptions, Fetcher};
use std::sync::Arc;
use std::time::Duration;

fn test_fetcher() -> Fetcher {
    let circuit_breaker = Arc::new(CircuitBreaker::new(3, 1, Duration::from_secs(30)));
    let domain_limiter = Arc::new(DomainLimiter::new(4));
    Fetcher::new(circuit_breaker, domain_limiter, FetchOptions::default()).unwrap()
}

#[tokio::test]
async fn fetch_extracts_title_links_and_meta_description() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(
            r#"<html><head><title>Hello</title>
               <meta name="description" content="a test page"></head>
               <body><a href="/other">next</a></body></html>"#,
        )
        .create_async()
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/page", server.url());
    let page = fetcher.fetch(&url).await.unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.title.as_deref(), Some("Hello"));
    assert_eq!(page.meta_description.as_deref(), Some("a test page"));
    assert!(page.links.iter().any(|l| l.contains("/other")));
}

#[tokio::test]
async fn repeated_server_errors_open_the_circuit_breaker() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/down").with_status(500).expect_at_least(1).create_async().await;

    let fetcher = test_fetcher();
    let url = format!("{}/down", server.url());

    // Each call exhausts its own retry budget against the failing endpoint;
    // after enough consecutive failures the breaker should trip open for
    // this domain and short-circuit further attempts without a request.
    for _ in 0..3 {
        let _ = fetcher.fetch(&url).await;
    }
    match fetcher.fetch(&url).await {
        Err(FetchError::CircuitOpen(_)) => {}
        other => panic!("expected circuit to be open after repeated failures, got {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/data.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/data.json", server.url());
    let result = fetcher.fetch(&url).await;
    assert!(result.is_err(), "json content-type is not in the html allow-list");
}
