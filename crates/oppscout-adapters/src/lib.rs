//! Source fetcher contract, per-source raw payloads, and fixture-first fetcher implementations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use oppscout_core::Candidate;
use oppscout_storage::{FetchError, HttpFetcher, SessionError, SessionPool};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod html;
pub mod raw;
pub mod registry;
pub mod sources;

pub use raw::RawItem;
pub use registry::{fetcher_for_source, SourceConfig, SourceMode};

pub const CRATE_NAME: &str = "oppscout-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crawlability {
    Api,
    PublicHtml,
    /// Needs a stateful page session; runs in the bounded session group.
    Browser,
    Manual,
}

impl Crawlability {
    pub fn needs_session(&self) -> bool {
        matches!(self, Crawlability::Browser)
    }
}

/// Everything a fetcher may touch during one run.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub run_id: Uuid,
    pub http: Arc<HttpFetcher>,
    pub sessions: SessionPool,
    pub workspace_root: PathBuf,
    pub today: NaiveDate,
}

impl FetchContext {
    pub fn fixture_path(&self, source_id: &str, file: &str) -> PathBuf {
        self.workspace_root.join("fixtures").join(source_id).join(file)
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("reading {path}: {source}")]
    Fixture {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{source_name} payload did not decode: {message}")]
    Decode {
        source_name: &'static str,
        message: String,
    },
    #[error("{fetcher} fetcher cannot parse a {found} payload")]
    ForeignPayload {
        fetcher: &'static str,
        found: &'static str,
    },
    #[error("invalid selector {0}")]
    Selector(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outcome of one fetcher invocation; failures are carried, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub source: &'static str,
    pub candidates: Vec<Candidate>,
    pub error: Option<String>,
}

impl FetchReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Registry key, also the fixture directory name.
    fn source_id(&self) -> &'static str;
    /// Display name written into `Candidate::source`.
    fn source_name(&self) -> &'static str;
    fn crawlability(&self) -> Crawlability;

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError>;

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError>;

    /// Fetch then parse inside this fetcher's error boundary.
    async fn fetch_candidates(&self, ctx: &FetchContext) -> FetchReport {
        let source = self.source_name();
        let span = info_span!("source_fetch", source, run_id = %ctx.run_id);
        async {
            let result = match self.fetch(ctx).await {
                Ok(raw) => self.parse(raw),
                Err(err) => Err(err),
            };
            match result {
                Ok(candidates) => {
                    info!(count = candidates.len(), "source fetched");
                    FetchReport {
                        source,
                        candidates,
                        error: None,
                    }
                }
                Err(err) => {
                    warn!(error = %err, "source failed, contributing no candidates");
                    FetchReport {
                        source,
                        candidates: Vec::new(),
                        error: Some(err.to_string()),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
