// crawlsentry: a polite distributed crawler daemon.
//
// Boots tracing, loads AppConfig from the environment, wires the shared
// Redis-backed store, fetcher, and robots gateway into an Orchestrator,
// then waits for a shutdown signal. Jobs are created and driven through
// the library API (see `crawlsentry::Orchestrator`); this binary only
// owns process lifecycle.

use anyhow::Result;
use crawlsentry::fetch::{CircuitBreaker, DomainLimiter, FetchOptions, Fetcher};
use crawlsentry::robots::RobotsGateway;
use crawlsentry::{AppConfig, DistributedStore, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(namespace = %config.namespace, "starting crawlsentry");

    let store = DistributedStore::connect(&config.redis_url)?;

    let circuit_breaker = Arc::new(CircuitBreaker::new(5, 2, Duration::from_secs(60)));
    let domain_limiter = Arc::new(DomainLimiter::new(4));
    let fetch_options = FetchOptions { user_agent: config.user_agent.clone(), ..FetchOptions::default() };
    let fetcher = Arc::new(Fetcher::new(circuit_breaker, domain_limiter, fetch_options)?);

    let http_client = reqwest::Client::builder().user_agent(config.user_agent.clone()).build()?;
    let robots = Arc::new(RobotsGateway::new(
        http_client,
        Some(store.clone()),
        format!("{}:robots", config.namespace),
        config.user_agent.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(store, fetcher, robots));

    tracing::info!("crawlsentry ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    drop(orchestrator);
    Ok(())
}
