//! Similarity Index capability: remote HTTP backend, in-memory backend, and the no-op backend.
//!
//! The index is a recall aid for dedup only. Every write is best-effort and the store is
//! always the source of truth, so the in-memory backend can be rebuilt from open records.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use oppscout_core::OpportunityRecord;
use oppscout_storage::{OpportunityStore, StoreError};
use serde::{Deserialize, Serialize};
use strsim::sorensen_dice;
use tokio::sync::RwLock;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::{join_url, post_json, ServiceError};

const SERVICE: &str = "similarity index";

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarHit {
    pub id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMetadata {
    pub source: String,
    pub category: String,
    pub chain: Option<String>,
    pub is_open: bool,
}

impl IndexMetadata {
    pub fn for_record(record: &OpportunityRecord) -> Self {
        Self {
            source: record.source.clone(),
            category: record.category.to_string(),
            chain: record.chain.clone(),
            is_open: record.is_open,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexFilter {
    pub open_only: bool,
}

impl IndexFilter {
    pub fn open_only() -> Self {
        Self { open_only: true }
    }
}

fn normalize_for_scoring(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn upsert(&self, id: Uuid, text: &str, metadata: &IndexMetadata) -> Result<(), ServiceError>;

    /// Up to `k` hits, best first.
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<SimilarHit>, ServiceError>;
}

/// Backend used when the index is switched off: accepts writes, never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSimilarityIndex;

#[async_trait]
impl SimilarityIndex for NullSimilarityIndex {
    async fn upsert(&self, _id: Uuid, _text: &str, _metadata: &IndexMetadata) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn query(
        &self,
        _text: &str,
        _k: usize,
        _filter: Option<&IndexFilter>,
    ) -> Result<Vec<SimilarHit>, ServiceError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
struct IndexedText {
    normalized: String,
    is_open: bool,
}

/// Process-local index scored with bigram Sørensen–Dice over normalized text.
#[derive(Debug, Default)]
pub struct InMemorySimilarityIndex {
    entries: RwLock<HashMap<Uuid, IndexedText>>,
}

impl InMemorySimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the store's open records.
    pub async fn hydrate(&self, store: &dyn OpportunityStore, limit: usize) -> Result<usize, StoreError> {
        let records = store.list_open(limit).await?;
        let mut entries = self.entries.write().await;
        for record in &records {
            entries.insert(
                record.id,
                IndexedText {
                    normalized: normalize_for_scoring(&record.dedup_blob()),
                    is_open: record.is_open,
                },
            );
        }
        info!(records = records.len(), "similarity index hydrated");
        Ok(records.len())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for InMemorySimilarityIndex {
    async fn upsert(&self, id: Uuid, text: &str, metadata: &IndexMetadata) -> Result<(), ServiceError> {
        self.entries.write().await.insert(
            id,
            IndexedText {
                normalized: normalize_for_scoring(text),
                is_open: metadata.is_open,
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<SimilarHit>, ServiceError> {
        let wanted = normalize_for_scoring(text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let open_only = filter.map(|f| f.open_only).unwrap_or(false);
        let entries = self.entries.read().await;
        let mut hits: Vec<SimilarHit> = entries
            .iter()
            .filter(|(_, entry)| !open_only || entry.is_open)
            .map(|(id, entry)| SimilarHit {
                id: *id,
                score: sorensen_dice(&wanted, &entry.normalized),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    n_results: usize,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: String,
    #[serde(default, alias = "similarity")]
    score: Option<f64>,
    #[serde(default)]
    distance: Option<f64>,
}

#[derive(Debug, Serialize)]
struct IndexRequest<'a> {
    id: Uuid,
    text: &'a str,
    metadata: &'a IndexMetadata,
}

pub struct HttpSimilarityIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSimilarityIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building similarity index client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SimilarityIndex for HttpSimilarityIndex {
    async fn upsert(&self, id: Uuid, text: &str, metadata: &IndexMetadata) -> Result<(), ServiceError> {
        let url = join_url(&self.base_url, "/ai/index");
        let _: serde_json::Value = post_json(&self.client, SERVICE, &url, &IndexRequest { id, text, metadata })
            .instrument(info_span!("index_upsert", %id))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<SimilarHit>, ServiceError> {
        let url = join_url(&self.base_url, "/ai/semantic-search");
        let request = SearchRequest {
            query: text,
            n_results: k,
            filter: filter
                .filter(|f| f.open_only)
                .map(|_| serde_json::json!({ "is_open": true })),
        };
        let response: SearchResponse = post_json(&self.client, SERVICE, &url, &request)
            .instrument(info_span!("index_query", k))
            .await?;
        let mut hits: Vec<SimilarHit> = response
            .results
            .into_iter()
            .filter_map(|r| {
                let score = r.score.or(r.distance.map(|d| 1.0 - d))?;
                let id = Uuid::parse_str(&r.id).ok()?;
                Some(SimilarHit { id, score })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}
