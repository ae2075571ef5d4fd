use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use oppscout_adapters::{
    fetcher_for_source, AdapterError, Crawlability, FetchContext, RawItem, SourceConfig, SourceFetcher,
};
use oppscout_core::{Candidate, RiskAssessment, SubscriberPreference};
use oppscout_storage::{MemoryOpportunityStore, MemorySubscriberDirectory, OpportunityStore};
use oppscout_sync::pipeline::write_reports;
use oppscout_sync::{
    Classification, ClassificationService, FixedHostResolver, InMemorySimilarityIndex, IndexFilter,
    IndexMetadata, LogNotifier, NullClassificationService, Notifier, PipelineConfig, PipelineDeps,
    ServiceError, SimilarHit, SimilarityIndex, SyncPipeline,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new("postgres://unused", workspace_root());
    config.freshness_cutoff_year = 2026;
    config
}

/// Returns a fixed candidate list; optionally needs a session and fails after acquiring it.
struct StaticFetcher {
    candidates: Vec<Candidate>,
    crawlability: Crawlability,
    fail: bool,
}

impl StaticFetcher {
    fn boxed(candidates: Vec<Candidate>) -> Box<dyn SourceFetcher> {
        Box::new(Self {
            candidates,
            crawlability: Crawlability::Api,
            fail: false,
        })
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    fn source_id(&self) -> &'static str {
        "static"
    }

    fn source_name(&self) -> &'static str {
        "Static"
    }

    fn crawlability(&self) -> Crawlability {
        self.crawlability
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        if self.crawlability.needs_session() {
            let _session = ctx.sessions.acquire(self.source_id()).await?;
            if self.fail {
                return Err(AdapterError::Selector("page layout changed".into()));
            }
        }
        Ok(Vec::new())
    }

    fn parse(&self, _raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        Ok(self.candidates.clone())
    }
}

enum Verdict {
    NotAnOpportunity,
    Down,
}

struct ScriptedClassifier(Verdict);

#[async_trait]
impl ClassificationService for ScriptedClassifier {
    async fn classify(&self, _text: &str, _source: &str) -> Result<Classification, ServiceError> {
        match self.0 {
            Verdict::NotAnOpportunity => Ok(Classification {
                is_opportunity: Some(false),
                ..Default::default()
            }),
            Verdict::Down => Err(ServiceError::Unavailable {
                service: "classification service",
                message: "timed out".into(),
            }),
        }
    }

    async fn assess_risk(&self, _candidate: &Candidate) -> Result<RiskAssessment, ServiceError> {
        Err(ServiceError::Unavailable {
            service: "classification service",
            message: "timed out".into(),
        })
    }
}

/// Cancels the run from inside the first classification call, so that item still finishes.
struct CancellingClassifier(CancellationToken);

#[async_trait]
impl ClassificationService for CancellingClassifier {
    async fn classify(&self, _text: &str, _source: &str) -> Result<Classification, ServiceError> {
        self.0.cancel();
        Ok(Classification::default())
    }

    async fn assess_risk(&self, _candidate: &Candidate) -> Result<RiskAssessment, ServiceError> {
        Err(ServiceError::Disabled("classification service"))
    }
}

/// Every lookup fails; writes are accepted.
struct UnreachableIndex;

#[async_trait]
impl SimilarityIndex for UnreachableIndex {
    async fn upsert(&self, _id: Uuid, _text: &str, _m: &IndexMetadata) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn query(
        &self,
        _text: &str,
        _k: usize,
        _filter: Option<&IndexFilter>,
    ) -> Result<Vec<SimilarHit>, ServiceError> {
        Err(ServiceError::Unavailable {
            service: "similarity index",
            message: "connection reset".into(),
        })
    }
}

fn solana_subscriber() -> SubscriberPreference {
    SubscriberPreference {
        user_id: Uuid::new_v4(),
        email: Some("sol@example.org".into()),
        preferred_chains: vec!["Solana".into()],
        preferred_categories: vec![],
        skills: vec![],
        notifications_enabled: true,
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryOpportunityStore>,
    deps: PipelineDeps,
}

fn harness(classifier: Arc<dyn ClassificationService>, subscribers: Vec<SubscriberPreference>, notifier: Arc<dyn Notifier>) -> Harness {
    let store = Arc::new(MemoryOpportunityStore::new());
    let deps = PipelineDeps {
        store: store.clone(),
        subscribers: Arc::new(MemorySubscriberDirectory::new(subscribers)),
        classifier,
        similarity: Arc::new(InMemorySimilarityIndex::new()),
        notifier,
        host_resolver: Arc::new(FixedHostResolver(true)),
    };
    Harness { store, deps }
}

fn default_harness() -> Harness {
    harness(Arc::new(NullClassificationService), Vec::new(), Arc::new(LogNotifier))
}

fn pipeline(h: &Harness, fetchers: Vec<Box<dyn SourceFetcher>>) -> SyncPipeline {
    SyncPipeline::new(config(), h.deps.clone())
        .unwrap()
        .with_fetchers(fetchers)
        .with_today(today())
}

fn grant_candidates() -> Vec<Candidate> {
    let a = Candidate {
        source_native_id: Some("1".into()),
        reward_pool: Some("$5,000".into()),
        deadline: Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
        ..Candidate::new("X", "Grant for DeFi tooling")
    };
    let b = Candidate {
        url: "https://x.org/grant-for-defi-tooling/?utm_source=twitter".into(),
        ..Candidate::new("Y", "Grant for DeFi Tooling")
    };
    vec![a, b]
}

#[tokio::test]
async fn near_duplicate_from_another_source_is_stored_once() {
    let h = default_harness();
    let summary = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates())])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.candidates_seen, 2);
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.deduplicated, 1);

    let records = h.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reward_pool.as_deref(), Some("$5,000"));
    assert_eq!(
        records[0].deadline,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn second_run_over_the_same_items_persists_nothing() {
    let h = default_harness();
    let first = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates())])
        .run_once()
        .await
        .unwrap();
    let second = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates())])
        .run_once()
        .await
        .unwrap();

    assert_eq!(first.persisted, 1);
    assert_eq!(second.persisted, 0);
    assert_eq!(second.deduplicated, 2);
    assert_eq!(h.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn deadline_before_the_cutoff_year_is_never_persisted() {
    let h = default_harness();
    let stale = Candidate {
        source_native_id: Some("old".into()),
        deadline: Some(Utc.with_ymd_and_hms(2024, 11, 30, 0, 0, 0).unwrap()),
        ..Candidate::new("X", "Retro funding round three")
    };
    let summary = pipeline(&h, vec![StaticFetcher::boxed(vec![stale])])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.rejected_stale, 1);
    assert_eq!(summary.persisted, 0);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn stale_deadline_found_only_in_the_description_is_rejected() {
    let h = default_harness();
    let stale = Candidate {
        source_native_id: Some("retro".into()),
        description: "Retro funding round. Deadline: 2024-05-01. Apply on the forum.".into(),
        ..Candidate::new("X", "Retro funding round four")
    };
    let summary = pipeline(&h, vec![StaticFetcher::boxed(vec![stale])])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.rejected_stale, 1);
    assert_eq!(summary.persisted, 0);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn similarity_outage_still_persists_new_items() {
    let mut h = default_harness();
    h.deps.similarity = Arc::new(UnreachableIndex);
    let summary = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates()[..1].to_vec())])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.deduplicated, 0);
    assert_eq!(h.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn cancel_after_persisting_still_notifies_what_was_stored() {
    let cancel = CancellationToken::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let h = harness(
        Arc::new(CancellingClassifier(cancel.clone())),
        vec![solana_subscriber()],
        notifier.clone(),
    );
    let candidates = vec![
        Candidate {
            chain: Some("Solana".into()),
            source_native_id: Some("s1".into()),
            ..Candidate::new("X", "Validator client grants program")
        },
        Candidate {
            chain: Some("Solana".into()),
            source_native_id: Some("s2".into()),
            ..Candidate::new("X", "Wallet adapter bounty series")
        },
    ];
    let summary = pipeline(&h, vec![StaticFetcher::boxed(candidates)])
        .with_cancellation(cancel)
        .run_once()
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.notified, 1);
    assert_eq!(notifier.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn chain_preference_gets_exactly_one_notification() {
    let notifier = Arc::new(RecordingNotifier::default());
    let h = harness(Arc::new(NullClassificationService), vec![solana_subscriber()], notifier.clone());
    let candidates = vec![
        Candidate {
            chain: Some("Solana".into()),
            source_native_id: Some("s".into()),
            ..Candidate::new("X", "Validator client grants program")
        },
        Candidate {
            chain: Some("Ethereum".into()),
            source_native_id: Some("e".into()),
            ..Candidate::new("X", "Layer two hackathon in Lisbon")
        },
    ];
    let summary = pipeline(&h, vec![StaticFetcher::boxed(candidates)])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.persisted, 2);
    assert_eq!(summary.notified, 1);
    let sent = notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "sol@example.org");
    assert!(sent[0].1.contains("Validator client grants program"));
}

#[tokio::test]
async fn classifier_rejection_is_counted_not_persisted() {
    let h = harness(
        Arc::new(ScriptedClassifier(Verdict::NotAnOpportunity)),
        Vec::new(),
        Arc::new(LogNotifier),
    );
    let summary = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates()[..1].to_vec())])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.rejected_by_classifier, 1);
    assert_eq!(summary.persisted, 0);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn classifier_outage_still_persists() {
    let h = harness(Arc::new(ScriptedClassifier(Verdict::Down)), Vec::new(), Arc::new(LogNotifier));
    let summary = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates()[..1].to_vec())])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.persisted, 1);
    let records = h.store.records().await;
    assert_eq!(records[0].risk, None);
    assert!(records[0].ai_score.is_some());
}

#[tokio::test]
async fn failing_session_fetcher_releases_its_session() {
    let h = default_harness();
    let broken = Box::new(StaticFetcher {
        candidates: vec![Candidate::new("X", "never parsed")],
        crawlability: Crawlability::Browser,
        fail: true,
    });
    let p = pipeline(&h, vec![broken, StaticFetcher::boxed(grant_candidates()[..1].to_vec())]);
    let summary = p.run_once().await.unwrap();

    assert_eq!(summary.fetchers_run, 2);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.persisted, 1);
    assert_eq!(p.sessions().opened_sessions(), 1);
    assert_eq!(p.sessions().closed_sessions(), 1);
    assert_eq!(p.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn cancelled_run_fetches_nothing() {
    let h = default_harness();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates())])
        .with_cancellation(cancel)
        .run_once()
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.fetchers_run, 0);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn fixture_sources_ingest_idempotently() {
    let h = default_harness();
    let fetchers = || {
        [
            ("reddit", Crawlability::Api),
            ("superteam", Crawlability::Api),
            ("dorahacks", Crawlability::Api),
            ("code4rena", Crawlability::PublicHtml),
            ("ethglobal", Crawlability::PublicHtml),
            ("devpost", Crawlability::Browser),
            ("sherlock", Crawlability::Api),
            ("questbook", Crawlability::Api),
            ("hackquest", Crawlability::Api),
            ("manual", Crawlability::Manual),
        ]
        .into_iter()
        .map(|(id, crawlability)| fetcher_for_source(&SourceConfig::fixture(id, crawlability)).unwrap())
        .collect::<Vec<_>>()
    };

    let mut cfg = config();
    cfg.freshness_cutoff_year = 2000;
    let first = SyncPipeline::new(cfg.clone(), h.deps.clone())
        .unwrap()
        .with_fetchers(fetchers())
        .with_today(today())
        .run_once()
        .await
        .unwrap();
    assert_eq!(first.fetch_failures, 0);
    assert_eq!(first.candidates_seen, 21);
    assert!(first.persisted > 0);
    let stored = h.store.count().await.unwrap();
    assert_eq!(stored, first.persisted as u64);

    let second = SyncPipeline::new(cfg, h.deps.clone())
        .unwrap()
        .with_fetchers(fetchers())
        .with_today(today())
        .run_once()
        .await
        .unwrap();
    assert_eq!(second.persisted, 0);
    assert_eq!(second.deduplicated, second.candidates_seen);
    assert_eq!(h.store.count().await.unwrap(), stored);
}

#[tokio::test]
async fn reports_land_under_the_run_id() {
    let h = default_harness();
    let summary = pipeline(&h, vec![StaticFetcher::boxed(grant_candidates())])
        .run_once()
        .await
        .unwrap();
    let records = h.store.records().await;

    let tmp = tempfile::tempdir().unwrap();
    let dir = write_reports(tmp.path(), &summary, &records).await.unwrap();
    assert_eq!(dir, tmp.path().join(summary.run_id.to_string()));

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("run_summary.json")).unwrap()).unwrap();
    assert_eq!(json["summary"]["persisted"], 1);
    assert_eq!(json["new_records"].as_array().unwrap().len(), 1);

    let brief = std::fs::read_to_string(dir.join("daily_brief.md")).unwrap();
    assert!(brief.starts_with("# Opportunity Scout Daily Brief"));
    assert!(brief.contains("Grant for DeFi tooling"));
}
