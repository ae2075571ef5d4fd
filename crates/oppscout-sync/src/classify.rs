//! Classification Service client: structured fields from raw text, plus the risk companion endpoint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use oppscout_core::{clamp_score, Candidate, RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};

use crate::{join_url, post_json, ServiceError};

const SERVICE: &str = "classification service";

/// Whatever the service chose to return. Absent fields leave the candidate untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub is_opportunity: Option<bool>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reward_pool: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub required_skills: Option<Vec<String>>,
    #[serde(default)]
    pub win_probability: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub strategy_tip: Option<String>,
    #[serde(default, alias = "confidence")]
    pub ai_score: Option<f64>,
}

impl Classification {
    /// Numeric confidence on the 0..=100 scale; values in `[0, 1]` are treated as fractions.
    pub fn score(&self) -> Option<u8> {
        let raw = self.ai_score.filter(|s| s.is_finite())?;
        let scaled = if (0.0..=1.0).contains(&raw) { raw * 100.0 } else { raw };
        Some(clamp_score(scaled.round() as i64))
    }
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    source: &'a str,
}

#[derive(Debug, Serialize)]
struct RiskRequest<'a> {
    opportunity: RiskSubject<'a>,
}

#[derive(Debug, Serialize)]
struct RiskSubject<'a> {
    title: &'a str,
    description: &'a str,
    url: &'a str,
    source: &'a str,
    chain: Option<&'a str>,
    reward_pool: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RiskResponse {
    risk_score: f64,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
}

#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(&self, text: &str, source: &str) -> Result<Classification, ServiceError>;
    async fn assess_risk(&self, candidate: &Candidate) -> Result<RiskAssessment, ServiceError>;
}

pub struct HttpClassificationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassificationService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building classification client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ClassificationService for HttpClassificationService {
    async fn classify(&self, text: &str, source: &str) -> Result<Classification, ServiceError> {
        let url = join_url(&self.base_url, "/ai/classify");
        post_json(&self.client, SERVICE, &url, &ClassifyRequest { text, source })
            .instrument(info_span!("classify", source))
            .await
    }

    async fn assess_risk(&self, candidate: &Candidate) -> Result<RiskAssessment, ServiceError> {
        let url = join_url(&self.base_url, "/ai/risk-assess");
        let request = RiskRequest {
            opportunity: RiskSubject {
                title: &candidate.title,
                description: &candidate.description,
                url: &candidate.url,
                source: &candidate.source,
                chain: candidate.chain.as_deref(),
                reward_pool: candidate.reward_pool.as_deref(),
            },
        };
        let response: RiskResponse = post_json(&self.client, SERVICE, &url, &request)
            .instrument(info_span!("risk_assess", source = %candidate.source))
            .await?;
        if !response.risk_score.is_finite() {
            return Err(ServiceError::Malformed {
                service: SERVICE,
                message: "non-numeric risk_score".to_string(),
            });
        }
        debug!(score = response.risk_score, "risk assessed");
        Ok(RiskAssessment {
            risk_score: clamp_score(response.risk_score.round() as i64),
            risk_level: response.risk_level.as_deref().and_then(RiskLevel::from_label),
            flags: response.flags,
        })
    }
}

/// Used when no classifier is configured; enrichment falls back to heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClassificationService;

#[async_trait]
impl ClassificationService for NullClassificationService {
    async fn classify(&self, _text: &str, _source: &str) -> Result<Classification, ServiceError> {
        Err(ServiceError::Disabled(SERVICE))
    }

    async fn assess_risk(&self, _candidate: &Candidate) -> Result<RiskAssessment, ServiceError> {
        Err(ServiceError::Disabled(SERVICE))
    }
}
