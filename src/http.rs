use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn base_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("prguard/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Client for idempotent requests (remote blocklist downloads): bounded
/// timeouts plus retries on transient failures.
pub fn build_client(timeout: Duration) -> Result<ClientWithMiddleware, reqwest::Error> {
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
        .build_with_max_retries(3);

    Ok(ClientBuilder::new(base_client(timeout)?)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Same timeouts as [`build_client`] but never retries. A statement that
/// timed out may already have been committed.
pub fn build_client_without_retries(
    timeout: Duration,
) -> Result<ClientWithMiddleware, reqwest::Error> {
    Ok(ClientBuilder::new(base_client(timeout)?).build())
}
