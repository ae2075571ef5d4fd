//! Pipeline Orchestrator: one run from fetch to notification.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use oppscout_adapters::{fetcher_for_source, FetchContext, FetchReport, SourceFetcher};
use oppscout_core::{Candidate, OpportunityRecord};
use oppscout_storage::{
    pg, HttpClientConfig, HttpFetcher, OpportunityStore, PgOpportunityStore, PgSubscriberDirectory,
    SessionPool, SessionPoolConfig, SubscriberDirectory,
};
use serde::Serialize;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classify::{ClassificationService, HttpClassificationService, NullClassificationService};
use crate::config::{load_source_registry, PipelineConfig, SimilarityBackend, SourceRegistry};
use crate::enrich::{DnsHostResolver, EnrichOutcome, Enricher, HostResolver};
use crate::notify::{HttpNotifier, LogNotifier, NotificationFanout, Notifier};
use crate::persist::{PersistOutcome, PersistenceGateway};
use crate::resolve::{IdentityResolver, Resolution};
use crate::similarity::{HttpSimilarityIndex, InMemorySimilarityIndex, NullSimilarityIndex, SimilarityIndex};

/// Upper bound on open records loaded into the in-memory index at startup.
const HYDRATE_LIMIT: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FetchingSync,
    FetchingAsync,
    EnrichingPersisting,
    Notifying,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Idle => "idle",
            RunPhase::FetchingSync => "fetching_sync",
            RunPhase::FetchingAsync => "fetching_async",
            RunPhase::EnrichingPersisting => "enriching_persisting",
            RunPhase::Notifying => "notifying",
        })
    }
}

/// Countable outcomes of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetchers_run: usize,
    pub fetch_failures: usize,
    pub candidates_seen: usize,
    pub deduplicated: usize,
    pub merged: usize,
    pub rejected_stale: usize,
    pub rejected_by_classifier: usize,
    pub persisted: usize,
    pub persist_failures: usize,
    pub notified: usize,
    pub notify_failures: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn start(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            fetchers_run: 0,
            fetch_failures: 0,
            candidates_seen: 0,
            deduplicated: 0,
            merged: 0,
            rejected_stale: 0,
            rejected_by_classifier: 0,
            persisted: 0,
            persist_failures: 0,
            notified: 0,
            notify_failures: 0,
            cancelled: false,
        }
    }

    fn absorb(&mut self, report: &FetchReport) {
        self.fetchers_run += 1;
        if report.failed() {
            self.fetch_failures += 1;
        }
        self.candidates_seen += report.candidates.len();
    }
}

/// External capabilities the orchestrator is built with. Null objects stand in for
/// anything unconfigured.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn OpportunityStore>,
    pub subscribers: Arc<dyn SubscriberDirectory>,
    pub classifier: Arc<dyn ClassificationService>,
    pub similarity: Arc<dyn SimilarityIndex>,
    pub notifier: Arc<dyn Notifier>,
    pub host_resolver: Arc<dyn HostResolver>,
}

pub struct SyncPipeline {
    config: PipelineConfig,
    deps: PipelineDeps,
    http: Arc<HttpFetcher>,
    sessions: SessionPool,
    fetchers: Vec<Box<dyn SourceFetcher>>,
    cancel: CancellationToken,
    today: Option<NaiveDate>,
}

impl SyncPipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: Some(config.user_agent.clone()),
            source_spacing: config.source_spacing(),
            ..Default::default()
        })?;
        let sessions = SessionPool::new(SessionPoolConfig {
            max_sessions: config.session_concurrency.max(1),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        });
        Ok(Self {
            config,
            deps,
            http: Arc::new(http),
            sessions,
            fetchers: Vec::new(),
            cancel: CancellationToken::new(),
            today: None,
        })
    }

    pub fn with_fetchers(mut self, fetchers: Vec<Box<dyn SourceFetcher>>) -> Self {
        self.fetchers = fetchers;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pin the date used to resolve year-less deadlines.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    fn enter(&self, run_id: Uuid, phase: RunPhase) {
        info!(%run_id, %phase, "run phase");
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        self.run(run_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid) -> Result<RunSummary> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let mut summary = RunSummary::start(run_id);
        let ctx = FetchContext {
            run_id,
            http: self.http.clone(),
            sessions: self.sessions.clone(),
            workspace_root: self.config.workspace_root.clone(),
            today,
        };

        let (session_fetchers, plain_fetchers): (Vec<_>, Vec<_>) = self
            .fetchers
            .iter()
            .partition(|f| f.crawlability().needs_session());

        self.enter(run_id, RunPhase::FetchingSync);
        let mut candidates: Vec<Candidate> = Vec::new();
        for fetcher in plain_fetchers {
            if self.cancel.is_cancelled() {
                break;
            }
            let report = fetcher.fetch_candidates(&ctx).await;
            summary.absorb(&report);
            candidates.extend(report.candidates);
        }

        self.enter(run_id, RunPhase::FetchingAsync);
        let cancel = &self.cancel;
        let ctx_ref = &ctx;
        let reports: Vec<FetchReport> = stream::iter(session_fetchers)
            .map(|fetcher| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(fetcher.fetch_candidates(ctx_ref).await)
            })
            .buffered(self.config.session_concurrency.max(1))
            .filter_map(|report| async move { report })
            .collect()
            .await;
        for report in reports {
            summary.absorb(&report);
            candidates.extend(report.candidates);
        }

        self.enter(run_id, RunPhase::EnrichingPersisting);
        let resolver = IdentityResolver::new(
            self.deps.store.clone(),
            self.deps.similarity.clone(),
            self.config.similarity_threshold,
            self.config.similarity_top_k,
            self.config.freshness_cutoff_year,
            today,
        );
        let enricher = Enricher::new(
            self.deps.classifier.clone(),
            self.deps.host_resolver.clone(),
            self.config.freshness_cutoff_year,
            today,
        );
        let gateway = PersistenceGateway::new(self.deps.store.clone(), self.deps.similarity.clone());

        let mut created = Vec::new();
        for candidate in candidates {
            if self.cancel.is_cancelled() {
                break;
            }
            self.process(candidate, &resolver, &enricher, &gateway, &mut summary, &mut created)
                .await;
        }

        // Persisted items are notified even after a cancel; a later run only sees them as duplicates.
        self.enter(run_id, RunPhase::Notifying);
        if !created.is_empty() {
            match self.deps.subscribers.notifiable_subscribers().await {
                Ok(subscribers) => {
                    let fanout = NotificationFanout::new(
                        self.deps.notifier.clone(),
                        self.config.notify_concurrency,
                        self.config.notifier_timeout(),
                    );
                    let outcome = fanout.dispatch(&created, &subscribers).await;
                    summary.notified = outcome.sent;
                    summary.notify_failures = outcome.failed;
                }
                Err(err) => warn!(error = %err, "could not load subscribers, skipping notifications"),
            }
        }

        summary.cancelled = self.cancel.is_cancelled();
        summary.finished_at = Utc::now();
        self.enter(run_id, RunPhase::Idle);
        info!(
            %run_id,
            fetchers_run = summary.fetchers_run,
            fetch_failures = summary.fetch_failures,
            candidates_seen = summary.candidates_seen,
            deduplicated = summary.deduplicated,
            merged = summary.merged,
            rejected_stale = summary.rejected_stale,
            rejected_by_classifier = summary.rejected_by_classifier,
            persisted = summary.persisted,
            persist_failures = summary.persist_failures,
            notified = summary.notified,
            notify_failures = summary.notify_failures,
            cancelled = summary.cancelled,
            "sync run finished"
        );

        if let Some(dir) = &self.config.reports_dir {
            if let Err(err) = write_reports(dir, &summary, &created).await {
                warn!(error = %err, "could not write run reports");
            }
        }
        Ok(summary)
    }

    async fn process(
        &self,
        mut candidate: Candidate,
        resolver: &IdentityResolver,
        enricher: &Enricher,
        gateway: &PersistenceGateway,
        summary: &mut RunSummary,
        created: &mut Vec<OpportunityRecord>,
    ) {
        match resolver.resolve(&mut candidate).await {
            Ok(Resolution::New) => {}
            Ok(Resolution::Duplicate { existing_id, merged, tier }) => {
                debug!(title = %candidate.title, %existing_id, ?tier, merged, "duplicate");
                summary.deduplicated += 1;
                if merged {
                    summary.merged += 1;
                }
                return;
            }
            Ok(Resolution::Stale) => {
                summary.rejected_stale += 1;
                return;
            }
            Err(err) => {
                warn!(source = %candidate.source, title = %candidate.title, error = %err, "identity lookup failed");
                summary.persist_failures += 1;
                return;
            }
        }

        let opportunity = match enricher.enrich(candidate).await {
            EnrichOutcome::Ready(opportunity) => opportunity,
            EnrichOutcome::RejectedByClassifier => {
                summary.rejected_by_classifier += 1;
                return;
            }
            EnrichOutcome::Stale => {
                summary.rejected_stale += 1;
                return;
            }
        };

        match gateway.persist(&opportunity).await {
            PersistOutcome::Created(record) => {
                summary.persisted += 1;
                created.push(*record);
            }
            PersistOutcome::Conflict => summary.deduplicated += 1,
            PersistOutcome::Failed(_) => summary.persist_failures += 1,
        }
    }
}

/// Writes `run_summary.json` and `daily_brief.md` under `<reports_root>/<run_id>/`.
pub async fn write_reports(
    reports_root: &Path,
    summary: &RunSummary,
    created: &[OpportunityRecord],
) -> Result<PathBuf> {
    let reports_dir = reports_root.join(summary.run_id.to_string());
    fs::create_dir_all(&reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let summary_json = serde_json::to_vec_pretty(&serde_json::json!({
        "summary": summary,
        "new_records": created.iter().map(|r| r.id).collect::<Vec<_>>(),
    }))
    .context("serializing run summary")?;
    fs::write(reports_dir.join("run_summary.json"), summary_json)
        .await
        .context("writing run_summary.json")?;

    let new_records = if created.is_empty() {
        "_No new opportunities._".to_string()
    } else {
        created
            .iter()
            .map(|r| {
                format!(
                    "- [{}]({}) ({}, {}, trust {})",
                    r.title,
                    r.url,
                    r.category,
                    r.chain.as_deref().unwrap_or("chain unknown"),
                    r.trust_score
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let brief = format!(
        "# Opportunity Scout Daily Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Candidates seen: {}\n- Persisted: {}\n- Deduplicated: {}\n- Rejected (stale): {}\n- Rejected (classifier): {}\n- Notified: {}\n\n## New Opportunities\n{}\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.candidates_seen,
        summary.persisted,
        summary.deduplicated,
        summary.rejected_stale,
        summary.rejected_by_classifier,
        summary.notified,
        new_records
    );
    fs::write(reports_dir.join("daily_brief.md"), brief)
        .await
        .context("writing daily_brief.md")?;

    Ok(reports_dir)
}

/// Fetchers for every enabled registry entry; an unknown enabled id is a configuration error.
pub fn fetchers_from_registry(registry: &SourceRegistry) -> Result<Vec<Box<dyn SourceFetcher>>> {
    registry
        .enabled()
        .map(|source| {
            fetcher_for_source(source)
                .with_context(|| format!("no fetcher registered for {}", source.source_id))
        })
        .collect()
}

async fn similarity_from_config(
    config: &PipelineConfig,
    store: &dyn OpportunityStore,
) -> Result<Arc<dyn SimilarityIndex>> {
    Ok(match &config.similarity {
        SimilarityBackend::Http { url } => {
            Arc::new(HttpSimilarityIndex::new(url.clone(), config.similarity_timeout())?)
        }
        SimilarityBackend::Memory => {
            let index = InMemorySimilarityIndex::new();
            if let Err(err) = index.hydrate(store, HYDRATE_LIMIT).await {
                warn!(error = %err, "similarity index starts empty");
            }
            Arc::new(index)
        }
        SimilarityBackend::Disabled => Arc::new(NullSimilarityIndex),
    })
}

pub async fn run_sync_once_from_env(cancel: CancellationToken) -> Result<RunSummary> {
    let config = PipelineConfig::from_env()?;
    let pool = pg::connect(&config.database_url).await?;
    pg::run_migrations(&pool).await?;

    let store: Arc<dyn OpportunityStore> = Arc::new(PgOpportunityStore::new(pool.clone()));
    let subscribers: Arc<dyn SubscriberDirectory> = Arc::new(PgSubscriberDirectory::new(pool));
    let similarity = similarity_from_config(&config, store.as_ref()).await?;
    let classifier: Arc<dyn ClassificationService> = match &config.classifier_url {
        Some(url) => Arc::new(HttpClassificationService::new(url.clone(), config.classifier_timeout())?),
        None => Arc::new(NullClassificationService),
    };
    let notifier: Arc<dyn Notifier> = match &config.notifier {
        Some(settings) => Arc::new(HttpNotifier::new(
            settings.url.clone(),
            settings.api_key.clone(),
            settings.from.clone(),
            config.notifier_timeout(),
        )?),
        None => Arc::new(LogNotifier),
    };
    let host_resolver = Arc::new(DnsHostResolver::new(config.dns_timeout()));

    let registry = load_source_registry(&config.workspace_root).await?;
    let fetchers = fetchers_from_registry(&registry)?;
    info!(
        fetchers = fetchers.len(),
        workspace = %config.workspace_root.display(),
        "starting sync run"
    );

    let deps = PipelineDeps {
        store,
        subscribers,
        classifier,
        similarity,
        notifier,
        host_resolver,
    };
    SyncPipeline::new(config, deps)?
        .with_fetchers(fetchers)
        .with_cancellation(cancel)
        .run_once()
        .await
}
