//! Notifier capability and the per-run subscriber fan-out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use oppscout_core::text::contains_word;
use oppscout_core::{Category, OpportunityRecord, SubscriberPreference};
use serde::Serialize;
use tracing::{info, warn};

use crate::ServiceError;

const SERVICE: &str = "notifier";
const EXCERPT_CHARS: usize = 200;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Delivers through an HTTP mail API with bearer authentication.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpNotifier {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building notifier client")?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        let mut request = self.client.post(&self.url).json(&OutboundMessage {
            from: &self.from,
            to: recipient,
            subject,
            body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
        info!(recipient, subject, "notification (log only)");
        Ok(())
    }
}

fn category_matches(preferred: &[String], category: Category) -> bool {
    preferred.is_empty()
        || preferred
            .iter()
            .any(|p| Category::from_label(p) == Some(category) || p.trim().eq_ignore_ascii_case(category.as_str()))
}

fn chain_matches(preferred: &[String], chain: Option<&str>) -> bool {
    if preferred.is_empty() {
        return true;
    }
    chain.is_some_and(|chain| preferred.iter().any(|p| p.trim().eq_ignore_ascii_case(chain.trim())))
}

/// Preference match (an empty list matches anything, but at least one list must be set)
/// or any subscriber skill appearing as a whole word in the record text.
pub fn is_relevant(record: &OpportunityRecord, subscriber: &SubscriberPreference) -> bool {
    let has_preferences =
        !subscriber.preferred_categories.is_empty() || !subscriber.preferred_chains.is_empty();
    let preference_match = has_preferences
        && category_matches(&subscriber.preferred_categories, record.category)
        && chain_matches(&subscriber.preferred_chains, record.chain.as_deref());
    if preference_match {
        return true;
    }
    let text = record.text_blob();
    subscriber
        .skills
        .iter()
        .filter(|s| !s.trim().is_empty())
        .any(|skill| contains_word(&text, skill))
}

pub fn compose(record: &OpportunityRecord) -> (String, String) {
    let subject = format!("New {}: {}", record.category, record.title);
    let excerpt: String = record.description.chars().take(EXCERPT_CHARS).collect();
    let risk = record
        .risk
        .as_ref()
        .map(|r| r.risk_score.to_string())
        .unwrap_or_else(|| "pending".to_string());
    let mut body = format!(
        "{}\n\nTrust score: {}/100\nRisk score: {}\n",
        record.title, record.trust_score, risk
    );
    if let Some(reward) = &record.reward_pool {
        body.push_str(&format!("Reward: {reward}\n"));
    }
    if let Some(deadline) = record.deadline {
        body.push_str(&format!("Deadline: {}\n", deadline.format("%Y-%m-%d")));
    }
    body.push_str(&format!("\n{excerpt}\n\n{}\n", record.url));
    (subject, body)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutOutcome {
    pub sent: usize,
    pub failed: usize,
}

pub struct NotificationFanout {
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
    timeout: Duration,
}

impl NotificationFanout {
    pub fn new(notifier: Arc<dyn Notifier>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            notifier,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// One message per relevant (record, subscriber) pair; a failed pair never blocks the rest.
    pub async fn dispatch(
        &self,
        records: &[OpportunityRecord],
        subscribers: &[SubscriberPreference],
    ) -> FanoutOutcome {
        let mut jobs = Vec::new();
        for record in records {
            let (subject, body) = compose(record);
            for subscriber in subscribers {
                let Some(email) = subscriber.email.as_deref().filter(|e| !e.trim().is_empty()) else {
                    continue;
                };
                if subscriber.notifications_enabled && is_relevant(record, subscriber) {
                    jobs.push((record.id, email.to_string(), subject.clone(), body.clone()));
                }
            }
        }

        let results: Vec<bool> = stream::iter(jobs)
            .map(|(record_id, email, subject, body)| async move {
                let outcome = tokio::time::timeout(self.timeout, self.notifier.send(&email, &subject, &body)).await;
                match outcome {
                    Ok(Ok(())) => true,
                    Ok(Err(err)) => {
                        warn!(%record_id, recipient = %email, error = %err, "notification failed");
                        false
                    }
                    Err(_) => {
                        warn!(%record_id, recipient = %email, "notification timed out");
                        false
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let sent = results.iter().filter(|ok| **ok).count();
        FanoutOutcome {
            sent,
            failed: results.len() - sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use oppscout_core::NewOpportunity;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;

    fn record(title: &str, chain: Option<&str>, category: Category) -> OpportunityRecord {
        NewOpportunity {
            title: title.into(),
            description: "Build tooling in Rust for validators.".into(),
            url: "https://x.org/a".into(),
            normalized_url: "https://x.org/a".into(),
            source: "X".into(),
            source_native_id: None,
            category,
            chain: chain.map(str::to_string),
            reward_pool: Some("$5,000".into()),
            deadline: None,
            tags: vec![],
            required_skills: vec![],
            content_hash: String::new(),
            ai_summary: None,
            ai_strategy: None,
            ai_score: None,
            win_probability: None,
            difficulty: None,
            trust_score: 80,
            risk: None,
            is_verified: false,
            is_open: true,
        }
        .into_record(Uuid::new_v4(), Utc::now())
    }

    fn subscriber(chains: &[&str], categories: &[&str], skills: &[&str]) -> SubscriberPreference {
        SubscriberPreference {
            user_id: Uuid::new_v4(),
            email: Some("dev@example.org".into()),
            preferred_chains: chains.iter().map(|s| s.to_string()).collect(),
            preferred_categories: categories.iter().map(|s| s.to_string()).collect(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            notifications_enabled: true,
        }
    }

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
            if self.fail_for.as_deref() == Some(recipient) {
                return Err(ServiceError::Status { service: SERVICE, status: 503 });
            }
            self.sent.lock().await.push(subject.to_string());
            Ok(())
        }
    }

    #[test]
    fn relevance_rules() {
        let solana = record("Solana grant", Some("Solana"), Category::Grant);
        assert!(is_relevant(&solana, &subscriber(&["solana"], &[], &[])));
        assert!(!is_relevant(&solana, &subscriber(&["Ethereum"], &[], &[])));
        assert!(is_relevant(&solana, &subscriber(&[], &["grants"], &[])));
        assert!(!is_relevant(&solana, &subscriber(&["Solana"], &["Hackathon"], &[])));
        assert!(!is_relevant(&solana, &subscriber(&[], &[], &[])));
        assert!(is_relevant(&solana, &subscriber(&[], &[], &["rust"])));
        assert!(!is_relevant(&solana, &subscriber(&[], &[], &["Go"])));
    }

    #[test]
    fn subject_and_body() {
        let (subject, body) = compose(&record("Solana grant", Some("Solana"), Category::Grant));
        assert_eq!(subject, "New Grant: Solana grant");
        assert!(body.contains("Trust score: 80/100"));
        assert!(body.contains("Risk score: pending"));
        assert!(body.contains("https://x.org/a"));
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_block_others() {
        let notifier = Arc::new(Recording {
            fail_for: Some("down@example.org".into()),
            ..Default::default()
        });
        let fanout = NotificationFanout::new(notifier.clone(), 4, Duration::from_secs(1));
        let mut down = subscriber(&["Solana"], &[], &[]);
        down.email = Some("down@example.org".into());
        let ok = subscriber(&["Solana"], &[], &[]);
        let outcome = fanout
            .dispatch(&[record("Solana grant", Some("Solana"), Category::Grant)], &[down, ok])
            .await;
        assert_eq!(outcome, FanoutOutcome { sent: 1, failed: 1 });
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }
}
