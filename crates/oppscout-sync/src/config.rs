//! Environment-driven pipeline configuration and the `sources.yaml` registry.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use oppscout_adapters::SourceConfig;
use oppscout_storage::http::DEFAULT_USER_AGENT;
use serde::Deserialize;
use tokio::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

pub async fn load_source_registry(workspace_root: &Path) -> Result<SourceRegistry> {
    let path = workspace_root.join("sources.yaml");
    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityBackend {
    Http { url: String },
    /// Process-local index hydrated from the store at startup.
    Memory,
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub workspace_root: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Minimum gap between two live requests to the same source.
    pub source_spacing_ms: u64,
    pub classifier_url: Option<String>,
    pub classifier_timeout_secs: u64,
    pub similarity: SimilarityBackend,
    pub similarity_timeout_secs: u64,
    pub similarity_threshold: f64,
    pub similarity_top_k: usize,
    pub notifier: Option<NotifierSettings>,
    pub notifier_timeout_secs: u64,
    pub notify_concurrency: usize,
    pub freshness_cutoff_year: i32,
    pub session_concurrency: usize,
    pub dns_timeout_ms: u64,
    pub reports_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Defaults for everything except the two values a run cannot do without.
    pub fn new(database_url: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            database_url: database_url.into(),
            workspace_root: workspace_root.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 20,
            source_spacing_ms: 500,
            classifier_url: None,
            classifier_timeout_secs: 15,
            similarity: SimilarityBackend::Memory,
            similarity_timeout_secs: 10,
            similarity_threshold: 0.85,
            similarity_top_k: 3,
            notifier: None,
            notifier_timeout_secs: 10,
            notify_concurrency: 8,
            freshness_cutoff_year: Utc::now().year(),
            session_concurrency: 2,
            dns_timeout_ms: 1500,
            reports_dir: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(database_url) = var("DATABASE_URL") else {
            bail!("DATABASE_URL is not set; the pipeline has nowhere to persist");
        };
        let workspace_root = var("OPPSCOUT_WORKSPACE").unwrap_or_else(|| ".".to_string());
        let mut config = Self::new(database_url, workspace_root);

        if let Some(agent) = var("OPPSCOUT_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(secs) = parse_var("OPPSCOUT_HTTP_TIMEOUT_SECS", var("OPPSCOUT_HTTP_TIMEOUT_SECS"))? {
            config.http_timeout_secs = secs;
        }
        if let Some(ms) = parse_var("SOURCE_SPACING_MS", var("SOURCE_SPACING_MS"))? {
            config.source_spacing_ms = ms;
        }

        config.classifier_url = var("CLASSIFIER_URL");
        if let Some(secs) = parse_var("CLASSIFIER_TIMEOUT_SECS", var("CLASSIFIER_TIMEOUT_SECS"))? {
            config.classifier_timeout_secs = secs;
        }

        let similarity_url = var("SIMILARITY_URL");
        config.similarity = match var("SIMILARITY_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("http") => match similarity_url {
                Some(url) => SimilarityBackend::Http { url },
                None => bail!("SIMILARITY_BACKEND=http requires SIMILARITY_URL"),
            },
            Some("memory") => SimilarityBackend::Memory,
            Some("disabled") | Some("none") | Some("off") => SimilarityBackend::Disabled,
            Some(other) => bail!("unknown SIMILARITY_BACKEND {other:?} (expected http, memory or disabled)"),
            None => match similarity_url {
                Some(url) => SimilarityBackend::Http { url },
                None => SimilarityBackend::Memory,
            },
        };
        if let Some(secs) = parse_var("SIMILARITY_TIMEOUT_SECS", var("SIMILARITY_TIMEOUT_SECS"))? {
            config.similarity_timeout_secs = secs;
        }
        if let Some(threshold) = parse_var::<f64>("SIMILARITY_THRESHOLD", var("SIMILARITY_THRESHOLD"))? {
            if !(0.0..=1.0).contains(&threshold) {
                bail!("SIMILARITY_THRESHOLD must be within 0..=1, got {threshold}");
            }
            config.similarity_threshold = threshold;
        }
        if let Some(k) = parse_var("SIMILARITY_TOP_K", var("SIMILARITY_TOP_K"))? {
            config.similarity_top_k = k;
        }

        config.notifier = var("NOTIFIER_URL").map(|url| NotifierSettings {
            url,
            api_key: var("NOTIFIER_API_KEY"),
            from: var("NOTIFIER_FROM").unwrap_or_else(|| "alerts@oppscout.local".to_string()),
        });
        if let Some(secs) = parse_var("NOTIFIER_TIMEOUT_SECS", var("NOTIFIER_TIMEOUT_SECS"))? {
            config.notifier_timeout_secs = secs;
        }
        if let Some(n) = parse_var("NOTIFY_CONCURRENCY", var("NOTIFY_CONCURRENCY"))? {
            config.notify_concurrency = n;
        }

        if let Some(year) = parse_var::<i32>("FRESHNESS_CUTOFF_YEAR", var("FRESHNESS_CUTOFF_YEAR"))? {
            config.freshness_cutoff_year = year;
        }
        if let Some(n) = parse_var("SESSION_CONCURRENCY", var("SESSION_CONCURRENCY"))? {
            config.session_concurrency = n;
        }
        if let Some(ms) = parse_var("DNS_TIMEOUT_MS", var("DNS_TIMEOUT_MS"))? {
            config.dns_timeout_ms = ms;
        }
        config.reports_dir = var("OPPSCOUT_REPORTS_DIR").map(PathBuf::from);

        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn source_spacing(&self) -> Duration {
        Duration::from_millis(self.source_spacing_ms)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }

    pub fn similarity_timeout(&self) -> Duration {
        Duration::from_secs(self.similarity_timeout_secs)
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier_timeout_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.parse::<T>().with_context(|| format!("invalid {key}={v:?}")))
        .transpose()
}
