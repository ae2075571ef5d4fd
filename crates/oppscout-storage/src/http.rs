//! GET client shared by the live source fetchers.
//!
//! Listing endpoints are public and throttle aggressively (Reddit answers 429 with a
//! `Retry-After`), so every request is spaced per source and throttling is waited out
//! instead of failing the fetcher on the first refusal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_USER_AGENT: &str = "oppscout/0.1 (+opportunity ingestion)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub first_wait: Duration,
    /// Upper bound for any wait, including a server-sent `Retry-After`.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            first_wait: Duration::from_millis(750),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry `retry` (0-based). The server's hint wins over doubling.
    pub fn wait(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or_else(|| self.first_wait.saturating_mul(2u32.saturating_pow(retry)))
            .min(self.max_wait)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Requests in flight across all sources.
    pub max_in_flight: usize,
    /// Minimum gap between two requests to the same source.
    pub source_spacing: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            max_in_flight: 8,
            source_spacing: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher is shutting down")]
    Closed,
}

/// Throttling and transient upstream failures; everything else in 4xx is final.
fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// `Retry-After` in delay-seconds form. The HTTP-date form is ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Arc<Semaphore>,
    source_spacing: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building source http client")?;

        Ok(Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            source_spacing: config.source_spacing,
            next_slot: Mutex::new(HashMap::new()),
            retry: config.retry,
        })
    }

    /// Books the next request slot for `source` and returns how long to wait for it.
    async fn reserve_slot(&self, source: &str) -> Duration {
        let now = Instant::now();
        let mut slots = self.next_slot.lock().await;
        let slot = slots
            .get(source)
            .copied()
            .filter(|slot| *slot > now)
            .unwrap_or(now);
        slots.insert(source.to_string(), slot + self.source_spacing);
        slot - now
    }

    /// GET `url` on behalf of `source` and return the body as text.
    pub async fn fetch_text(&self, run_id: Uuid, source: &str, url: &str) -> Result<String, FetchError> {
        let span = info_span!("http_fetch", %run_id, source, url);
        async {
            let mut retry = 0;
            loop {
                let wait = self.reserve_slot(source).await;
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                let _permit = self.in_flight.acquire().await.map_err(|_| FetchError::Closed)?;

                let (retry_hint, failure) = match self.client.get(url).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let body = resp.text().await?;
                        debug!(bytes = body.len(), retries = retry, "fetched");
                        return Ok(body);
                    }
                    Ok(resp) => {
                        let status = resp.status();
                        let failure = FetchError::HttpStatus {
                            status: status.as_u16(),
                            url: resp.url().to_string(),
                        };
                        if !retryable_status(status) {
                            return Err(failure);
                        }
                        (retry_after(resp.headers()), failure)
                    }
                    Err(err) if retryable_error(&err) => (None, FetchError::Request(err)),
                    Err(err) => return Err(FetchError::Request(err)),
                };

                if retry >= self.retry.retries {
                    return Err(failure);
                }
                let wait = self.retry.wait(retry, retry_hint);
                warn!(error = %failure, retry, wait_ms = wait.as_millis() as u64, "retrying");
                tokio::time::sleep(wait).await;
                retry += 1;
            }
        }
        .instrument(span)
        .await
    }
}
