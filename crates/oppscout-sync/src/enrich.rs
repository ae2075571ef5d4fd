//! Enrichment of New candidates into insertable opportunities.
//!
//! Every step degrades on its own: a failed classifier call leaves the heuristic fields in
//! place, a failed risk call leaves risk unset, and a slow DNS lookup counts as unresolved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use oppscout_core::text::{
    content_hash, extract_chain, extract_deadline_at, extract_reward_pool, extract_skills, is_fresh,
    normalize_url, parse_date_loose,
};
use oppscout_core::trust::{compute_trust, host_of};
use oppscout_core::{
    Candidate, Category, Difficulty, NewOpportunity, RiskAssessment, WinProbability,
};
use tracing::{debug, warn};

use crate::classify::{Classification, ClassificationService};
use crate::ServiceError;

/// Answers whether a host name currently resolves.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolves(&self, host: &str) -> bool;
}

/// System DNS lookup bounded by a timeout; a timeout counts as "does not resolve".
#[derive(Debug, Clone, Copy)]
pub struct DnsHostResolver {
    timeout: Duration,
}

impl DnsHostResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostResolver for DnsHostResolver {
    async fn resolves(&self, host: &str) -> bool {
        let lookup = tokio::net::lookup_host((host, 443));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(err)) => {
                debug!(host, error = %err, "host did not resolve");
                false
            }
            Err(_) => {
                debug!(host, "dns lookup timed out");
                false
            }
        }
    }
}

/// Gives the same answer for every host; for offline runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedHostResolver(pub bool);

#[async_trait]
impl HostResolver for FixedHostResolver {
    async fn resolves(&self, _host: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    Ready(Box<NewOpportunity>),
    RejectedByClassifier,
    /// The only deadline found, in the text or from the classifier, is past the cutoff.
    Stale,
}

/// Per-field results the classifier returned, kept apart from the candidate.
#[derive(Debug, Default)]
struct ModelFields {
    ai_summary: Option<String>,
    ai_strategy: Option<String>,
    ai_score: Option<u8>,
    win_probability: Option<WinProbability>,
    difficulty: Option<Difficulty>,
}

pub struct Enricher {
    classifier: Arc<dyn ClassificationService>,
    hosts: Arc<dyn HostResolver>,
    freshness_cutoff_year: i32,
    today: NaiveDate,
}

impl Enricher {
    pub fn new(
        classifier: Arc<dyn ClassificationService>,
        hosts: Arc<dyn HostResolver>,
        freshness_cutoff_year: i32,
        today: NaiveDate,
    ) -> Self {
        Self {
            classifier,
            hosts,
            freshness_cutoff_year,
            today,
        }
    }

    pub async fn enrich(&self, mut candidate: Candidate) -> EnrichOutcome {
        let text = candidate.text_blob();

        if candidate.chain_is_unknown() {
            if let Some(chain) = extract_chain(&text) {
                candidate.chain = Some(chain);
            }
        }
        if candidate.reward_is_placeholder() {
            if let Some(reward) = extract_reward_pool(&text) {
                candidate.reward_pool = Some(reward);
            }
        }
        if candidate.deadline.is_none() {
            candidate.deadline = extract_deadline_at(&text, self.today);
            if self.is_stale(&candidate) {
                debug!(title = %candidate.title, "deadline in text is past the cutoff");
                return EnrichOutcome::Stale;
            }
        }

        let mut model = ModelFields::default();
        match self.classifier.classify(&text, &candidate.source).await {
            Ok(classification) => {
                if classification.is_opportunity == Some(false) {
                    debug!(title = %candidate.title, "classifier says not an opportunity");
                    return EnrichOutcome::RejectedByClassifier;
                }
                model = merge_classification(&mut candidate, classification);
                if self.is_stale(&candidate) {
                    debug!(title = %candidate.title, "classifier deadline is past the cutoff");
                    return EnrichOutcome::Stale;
                }
            }
            Err(err) => log_degraded("classification", &candidate, &err),
        }

        let risk = match self.classifier.assess_risk(&candidate).await {
            Ok(risk) => Some(risk),
            Err(err) => {
                log_degraded("risk assessment", &candidate, &err);
                None
            }
        };

        // Recompute: the classifier may have replaced title or description inputs.
        let text = candidate.text_blob();
        if candidate.required_skills.is_empty() {
            candidate.required_skills = extract_skills(&text).into_iter().collect();
        }
        let category = candidate.category.unwrap_or_else(|| Category::infer(&text));

        // Without a host there is nothing to look up, so no DNS penalty.
        let host_resolves = match host_of(&candidate.url) {
            Some(host) => self.hosts.resolves(&host).await,
            None => true,
        };
        let trust_score = compute_trust(&candidate, host_resolves);
        let ai_score = model
            .ai_score
            .unwrap_or_else(|| synthesize_ai_score(model.win_probability, candidate.required_skills.len()));

        EnrichOutcome::Ready(Box::new(build_opportunity(
            candidate, category, model, ai_score, trust_score, risk,
        )))
    }

    fn is_stale(&self, candidate: &Candidate) -> bool {
        candidate
            .deadline
            .is_some_and(|d| !is_fresh(d, self.freshness_cutoff_year))
    }
}

fn log_degraded(stage: &'static str, candidate: &Candidate, err: &ServiceError) {
    if err.is_disabled() {
        debug!(stage, title = %candidate.title, "service disabled, heuristics only");
    } else {
        warn!(stage, source = %candidate.source, title = %candidate.title, error = %err, "degraded to heuristics");
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Overwrites only the fields the classifier explicitly returned.
fn merge_classification(candidate: &mut Candidate, c: Classification) -> ModelFields {
    let model = ModelFields {
        ai_score: c.score(),
        ai_summary: present(c.ai_summary),
        ai_strategy: present(c.strategy_tip),
        win_probability: c.win_probability.as_deref().and_then(WinProbability::from_label),
        difficulty: c.difficulty.as_deref().and_then(Difficulty::from_label),
    };
    if let Some(category) = c.category.as_deref().and_then(Category::from_label) {
        candidate.category = Some(category);
    }
    if let Some(title) = present(c.title) {
        candidate.title = title;
    }
    if let Some(reward) = present(c.reward_pool) {
        candidate.reward_pool = Some(reward);
    }
    if let Some(deadline) = c.deadline.as_deref().and_then(parse_date_loose) {
        candidate.deadline = Some(deadline);
    }
    if let Some(chain) = present(c.chain) {
        candidate.chain = Some(chain);
    }
    if let Some(skills) = c.required_skills.filter(|s| !s.is_empty()) {
        candidate.required_skills = skills;
    }
    model
}

/// Score used when the classifier gave none: win-probability tier plus two points per skill.
pub fn synthesize_ai_score(win_probability: Option<WinProbability>, skill_count: usize) -> u8 {
    let base: i64 = match win_probability {
        Some(WinProbability::High) => 85,
        Some(WinProbability::Medium) => 65,
        Some(WinProbability::Low) => 45,
        None => 55,
    };
    let skills = i64::try_from(skill_count).unwrap_or(i64::MAX).min(50);
    oppscout_core::clamp_score(base + 2 * skills)
}

fn build_opportunity(
    candidate: Candidate,
    category: Category,
    model: ModelFields,
    ai_score: u8,
    trust_score: u8,
    risk: Option<RiskAssessment>,
) -> NewOpportunity {
    let normalized_url = normalize_url(&candidate.url);
    let content_hash = content_hash(&candidate.text_blob());
    NewOpportunity {
        title: candidate.title,
        description: candidate.description,
        url: candidate.url,
        normalized_url,
        source: candidate.source,
        source_native_id: candidate.source_native_id,
        category,
        chain: candidate.chain,
        reward_pool: candidate.reward_pool,
        deadline: candidate.deadline,
        tags: candidate.tags,
        required_skills: candidate.required_skills,
        content_hash,
        ai_summary: model.ai_summary,
        ai_strategy: model.ai_strategy,
        ai_score: Some(ai_score),
        win_probability: model.win_probability,
        difficulty: model.difficulty,
        trust_score,
        risk,
        is_verified: candidate.is_verified,
        is_open: true,
    }
}

#[cfg(test)]
mod tests {
    use oppscout_core::RiskLevel;

    use super::*;
    use crate::classify::NullClassificationService;

    struct Scripted {
        classification: Result<Classification, ()>,
        risk: Option<RiskAssessment>,
    }

    #[async_trait]
    impl ClassificationService for Scripted {
        async fn classify(&self, _text: &str, _source: &str) -> Result<Classification, ServiceError> {
            self.classification.clone().map_err(|_| ServiceError::Unavailable {
                service: "classification service",
                message: "timeout".into(),
            })
        }

        async fn assess_risk(&self, _candidate: &Candidate) -> Result<RiskAssessment, ServiceError> {
            self.risk.clone().ok_or(ServiceError::Status {
                service: "classification service",
                status: 502,
            })
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
    }

    fn enricher(classifier: Arc<dyn ClassificationService>) -> Enricher {
        Enricher::new(classifier, Arc::new(FixedHostResolver(true)), 2026, today())
    }

    fn candidate() -> Candidate {
        Candidate {
            description: "Prize pool: $25,000 for Solana builders shipping Rust tooling. Deadline: 2026-04-30"
                .into(),
            url: "https://www.example.org/hack/?utm_source=x".into(),
            reward_pool: Some("TBD".into()),
            ..Candidate::new("Reddit", "Validator tooling hackathon")
        }
    }

    fn ready(outcome: EnrichOutcome) -> NewOpportunity {
        match outcome {
            EnrichOutcome::Ready(opp) => *opp,
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn heuristics_fill_gaps_without_a_classifier() {
        let opp = ready(enricher(Arc::new(NullClassificationService)).enrich(candidate()).await);
        assert_eq!(opp.chain.as_deref(), Some("Solana"));
        assert_eq!(opp.reward_pool.as_deref(), Some("$25,000"));
        assert_eq!(opp.deadline.map(|d| d.date_naive().to_string()), Some("2026-04-30".into()));
        assert_eq!(opp.category, Category::Hackathon);
        assert_eq!(opp.required_skills, vec!["Rust".to_string()]);
        assert_eq!(opp.normalized_url, "https://example.org/hack");
        assert_eq!(opp.risk, None);
        assert_eq!(opp.ai_score, Some(57));
        assert!(!opp.content_hash.is_empty());
        assert!(opp.is_open);
    }

    #[tokio::test]
    async fn classifier_output_overrides_only_returned_fields() {
        let classifier = Scripted {
            classification: Ok(Classification {
                is_opportunity: Some(true),
                category: Some("Grant".into()),
                reward_pool: Some("$30,000".into()),
                win_probability: Some("High".into()),
                ai_summary: Some("Tooling round".into()),
                ..Default::default()
            }),
            risk: Some(RiskAssessment {
                risk_score: 12,
                risk_level: Some(RiskLevel::Low),
                flags: vec![],
            }),
        };
        let opp = ready(enricher(Arc::new(classifier)).enrich(candidate()).await);
        assert_eq!(opp.category, Category::Grant);
        assert_eq!(opp.reward_pool.as_deref(), Some("$30,000"));
        assert_eq!(opp.title, "Validator tooling hackathon");
        assert_eq!(opp.win_probability, Some(WinProbability::High));
        assert_eq!(opp.ai_score, Some(87));
        assert_eq!(opp.ai_summary.as_deref(), Some("Tooling round"));
        assert_eq!(opp.risk.map(|r| r.risk_score), Some(12));
    }

    #[tokio::test]
    async fn explicit_not_an_opportunity_rejects() {
        let classifier = Scripted {
            classification: Ok(Classification {
                is_opportunity: Some(false),
                ..Default::default()
            }),
            risk: None,
        };
        let outcome = enricher(Arc::new(classifier)).enrich(candidate()).await;
        assert_eq!(outcome, EnrichOutcome::RejectedByClassifier);
    }

    #[tokio::test]
    async fn classifier_failure_degrades() {
        let classifier = Scripted {
            classification: Err(()),
            risk: None,
        };
        let opp = ready(enricher(Arc::new(classifier)).enrich(candidate()).await);
        assert_eq!(opp.category, Category::Hackathon);
        assert_eq!(opp.reward_pool.as_deref(), Some("$25,000"));
    }

    #[tokio::test]
    async fn unresolved_host_lowers_trust() {
        let e = Enricher::new(Arc::new(NullClassificationService), Arc::new(FixedHostResolver(false)), 2026, today());
        let opp = ready(e.enrich(candidate()).await);
        assert_eq!(opp.trust_score, 50);
    }

    #[tokio::test]
    async fn missing_url_skips_the_dns_penalty() {
        let e = Enricher::new(Arc::new(NullClassificationService), Arc::new(FixedHostResolver(false)), 2026, today());
        let opp = ready(e.enrich(Candidate { url: String::new(), ..candidate() }).await);
        assert_eq!(opp.trust_score, 80);
    }

    #[tokio::test]
    async fn stale_deadline_in_text_is_rejected() {
        let stale = Candidate {
            description: "Retro funding round. Deadline: 2024-05-01. Apply on the forum.".into(),
            ..candidate()
        };
        let outcome = enricher(Arc::new(NullClassificationService)).enrich(stale).await;
        assert_eq!(outcome, EnrichOutcome::Stale);
    }

    #[tokio::test]
    async fn stale_classifier_deadline_is_rejected() {
        let classifier = Scripted {
            classification: Ok(Classification {
                deadline: Some("2023-12-01".into()),
                ..Default::default()
            }),
            risk: None,
        };
        let outcome = enricher(Arc::new(classifier)).enrich(candidate()).await;
        assert_eq!(outcome, EnrichOutcome::Stale);
    }

    #[test]
    fn synthesized_scores_stay_bounded() {
        assert_eq!(synthesize_ai_score(None, 0), 55);
        assert_eq!(synthesize_ai_score(Some(WinProbability::Low), 3), 51);
        assert_eq!(synthesize_ai_score(Some(WinProbability::High), 40), 100);
    }
}
