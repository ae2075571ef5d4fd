//! Scoped HTTP sessions for sources that need a cookie-carrying, serialized page flow.
//!
//! A [`PageSession`] is a cookie-isolated HTTP client; it does not execute scripts, so
//! fetchers that need client-rendered data point it at the site's JSON endpoint. Sessions
//! come from a bounded [`SessionPool`] and are torn down when dropped, so every exit path of
//! a fetcher (success, `?`, panic unwinding) releases one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info_span, Instrument};

use crate::http::{FetchError, DEFAULT_USER_AGENT};

#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    pub max_sessions: usize,
    pub navigation_timeout: Duration,
    pub acquire_timeout: Duration,
    pub user_agent: String,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 2,
            navigation_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(60),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out waiting for a free page session")]
    AcquireTimeout,
    #[error("session pool is closed")]
    Closed,
    #[error("could not build session client: {0}")]
    Build(#[source] reqwest::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug)]
struct PoolCounters {
    live: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct SessionPool {
    config: SessionPoolConfig,
    permits: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
}

impl SessionPool {
    pub fn new(config: SessionPoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_sessions.max(1)));
        Self {
            config,
            permits,
            counters: Arc::new(PoolCounters {
                live: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait (bounded) for a free slot and open a fresh cookie-isolated HTTP session.
    pub async fn acquire(&self, source: &str) -> Result<PageSession, SessionError> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| SessionError::AcquireTimeout)?
        .map_err(|_| SessionError::Closed)?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(self.config.navigation_timeout)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(SessionError::Build)?;

        self.counters.live.fetch_add(1, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        debug!(source, "page session opened");

        Ok(PageSession {
            source: source.to_string(),
            client,
            counters: self.counters.clone(),
            _permit: permit,
        })
    }

    pub fn live_sessions(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct PageSession {
    source: String,
    client: reqwest::Client,
    counters: Arc<PoolCounters>,
    _permit: OwnedSemaphorePermit,
}

impl PageSession {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// GET `url` and return the body as served. Cookies persist for the session's lifetime.
    pub async fn goto(&self, url: &str) -> Result<String, SessionError> {
        let span = info_span!("page_goto", source = %self.source, url);
        async {
            let resp = self.client.get(url).send().await.map_err(FetchError::from)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(SessionError::Fetch(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                }));
            }
            let body = resp.text().await.map_err(FetchError::from)?;
            debug!(bytes = body.len(), "page loaded");
            Ok(body)
        }
        .instrument(span)
        .await
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        debug!(source = %self.source, "page session closed");
    }
}
