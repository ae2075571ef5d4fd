//! Core domain model for oppscout: fetched candidates, persisted opportunities, subscribers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod text;
pub mod trust;

pub const CRATE_NAME: &str = "oppscout-core";

/// Number of description characters that go into the short dedup blob.
pub const DEDUP_BLOB_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Grant,
    Hackathon,
    Bounty,
    Airdrop,
    Testnet,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Grant => "Grant",
            Category::Hackathon => "Hackathon",
            Category::Bounty => "Bounty",
            Category::Airdrop => "Airdrop",
            Category::Testnet => "Testnet",
        }
    }

    /// Maps loose labels ("grants", "project", "bug bounty") onto a category.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_ascii_lowercase();
        let lower = lower.trim_end_matches('s');
        match lower {
            "grant" | "project" | "rfp" => Some(Category::Grant),
            "hackathon" | "buidlathon" => Some(Category::Hackathon),
            "bounty" | "bug bounty" | "audit" | "contest" | "job" => Some(Category::Bounty),
            "airdrop" => Some(Category::Airdrop),
            "testnet" => Some(Category::Testnet),
            _ => None,
        }
    }

    /// Keyword guess used when neither the source nor the classifier names a category.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("hackathon") {
            Category::Hackathon
        } else if lower.contains("bounty") || lower.contains("audit") {
            Category::Bounty
        } else if lower.contains("airdrop") {
            Category::Airdrop
        } else if lower.contains("testnet") {
            Category::Testnet
        } else {
            Category::Grant
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinProbability {
    Low,
    Medium,
    High,
}

impl WinProbability {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(WinProbability::Low),
            "medium" | "moderate" => Some(WinProbability::Medium),
            "high" => Some(WinProbability::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WinProbability::Low => "Low",
            WinProbability::Medium => "Medium",
            WinProbability::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Expert,
}

impl Difficulty {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "beginner" | "easy" => Some(Difficulty::Beginner),
            "intermediate" | "medium" => Some(Difficulty::Intermediate),
            "expert" | "advanced" | "hard" => Some(Difficulty::Expert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Expert => "Expert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

/// Semantic risk signal from the classification service's companion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub risk_level: Option<RiskLevel>,
    pub flags: Vec<String>,
}

/// Clamp any integer score into the 0..=100 range used by every score field.
pub fn clamp_score(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Unpersisted, source-native opportunity produced by a fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    pub source_native_id: Option<String>,
    pub category: Option<Category>,
    pub chain: Option<String>,
    pub reward_pool: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// Set by fetchers whose listings are curated by the platform itself.
    #[serde(default)]
    pub is_verified: bool,
}

/// Title plus the first [`DEDUP_BLOB_DESCRIPTION_CHARS`] characters of the description.
pub fn dedup_blob(title: &str, description: &str) -> String {
    let head: String = description.chars().take(DEDUP_BLOB_DESCRIPTION_CHARS).collect();
    format!("{title} {head}").trim().to_string()
}

impl Candidate {
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Title and full description, the text every extractor runs over.
    pub fn text_blob(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// Title plus the head of the description, used to query the similarity index.
    pub fn dedup_blob(&self) -> String {
        dedup_blob(&self.title, &self.description)
    }

    /// Chain is missing or a placeholder.
    pub fn chain_is_unknown(&self) -> bool {
        match self.chain.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(chain) => chain.eq_ignore_ascii_case("unknown"),
        }
    }

    /// Reward is missing or a placeholder such as "TBD".
    pub fn reward_is_placeholder(&self) -> bool {
        match self.reward_pool.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(reward) => {
                let upper = reward.to_ascii_uppercase();
                upper.contains("TBD") || upper.contains("TBA")
            }
        }
    }
}

/// Fully enriched opportunity ready for insertion; the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOpportunity {
    pub title: String,
    pub description: String,
    pub url: String,
    pub normalized_url: String,
    pub source: String,
    pub source_native_id: Option<String>,
    pub category: Category,
    pub chain: Option<String>,
    pub reward_pool: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub required_skills: Vec<String>,
    pub content_hash: String,
    pub ai_summary: Option<String>,
    pub ai_strategy: Option<String>,
    pub ai_score: Option<u8>,
    pub win_probability: Option<WinProbability>,
    pub difficulty: Option<Difficulty>,
    pub trust_score: u8,
    pub risk: Option<RiskAssessment>,
    pub is_verified: bool,
    pub is_open: bool,
}

impl NewOpportunity {
    pub fn into_record(self, id: Uuid, now: DateTime<Utc>) -> OpportunityRecord {
        OpportunityRecord {
            id,
            title: self.title,
            description: self.description,
            url: self.url,
            normalized_url: self.normalized_url,
            source: self.source,
            source_native_id: self.source_native_id,
            category: self.category,
            chain: self.chain,
            reward_pool: self.reward_pool,
            deadline: self.deadline,
            tags: self.tags,
            required_skills: self.required_skills,
            content_hash: self.content_hash,
            ai_summary: self.ai_summary,
            ai_strategy: self.ai_strategy,
            ai_score: self.ai_score,
            win_probability: self.win_probability,
            difficulty: self.difficulty,
            trust_score: self.trust_score,
            risk: self.risk,
            is_verified: self.is_verified,
            is_open: self.is_open,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persisted, store-resident opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub url: String,
    pub normalized_url: String,
    pub source: String,
    pub source_native_id: Option<String>,
    pub category: Category,
    pub chain: Option<String>,
    pub reward_pool: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub required_skills: Vec<String>,
    pub content_hash: String,
    pub ai_summary: Option<String>,
    pub ai_strategy: Option<String>,
    pub ai_score: Option<u8>,
    pub win_probability: Option<WinProbability>,
    pub difficulty: Option<Difficulty>,
    pub trust_score: u8,
    pub risk: Option<RiskAssessment>,
    pub is_verified: bool,
    pub is_open: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpportunityRecord {
    pub fn text_blob(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// Same text a candidate queries the similarity index with.
    pub fn dedup_blob(&self) -> String {
        dedup_blob(&self.title, &self.description)
    }

    /// Fill-only merge: populated fields are never cleared or overwritten.
    pub fn apply_patch(&mut self, patch: &MissingFieldPatch) -> bool {
        let mut changed = false;
        if self.reward_pool.as_deref().map_or(true, |r| r.trim().is_empty()) {
            if let Some(reward) = &patch.reward_pool {
                self.reward_pool = Some(reward.clone());
                changed = true;
            }
        }
        if self.deadline.is_none() {
            if let Some(deadline) = patch.deadline {
                self.deadline = Some(deadline);
                changed = true;
            }
        }
        if self.required_skills.is_empty() && !patch.required_skills.is_empty() {
            self.required_skills = patch.required_skills.clone();
            changed = true;
        }
        changed
    }
}

/// Fields a duplicate candidate may contribute to an existing record that lacks them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingFieldPatch {
    pub reward_pool: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub required_skills: Vec<String>,
}

impl MissingFieldPatch {
    /// Returns `None` when the candidate has nothing the existing record is missing.
    pub fn between(existing: &OpportunityRecord, candidate: &Candidate) -> Option<Self> {
        let mut patch = MissingFieldPatch::default();
        let existing_reward_blank = existing
            .reward_pool
            .as_deref()
            .map_or(true, |r| r.trim().is_empty());
        if existing_reward_blank && !candidate.reward_is_placeholder() {
            patch.reward_pool = candidate.reward_pool.clone();
        }
        if existing.deadline.is_none() {
            patch.deadline = candidate.deadline;
        }
        if existing.required_skills.is_empty() {
            patch.required_skills = candidate.required_skills.clone();
        }
        if patch.is_empty() {
            None
        } else {
            Some(patch)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reward_pool.is_none() && self.deadline.is_none() && self.required_skills.is_empty()
    }
}

/// Read-only view of a user's notification preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberPreference {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub preferred_chains: Vec<String>,
    pub preferred_categories: Vec<String>,
    pub skills: Vec<String>,
    pub notifications_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> OpportunityRecord {
        NewOpportunity {
            title: "Grant for DeFi tooling".into(),
            description: String::new(),
            url: String::new(),
            normalized_url: String::new(),
            source: "X".into(),
            source_native_id: Some("1".into()),
            category: Category::Grant,
            chain: None,
            reward_pool: None,
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

    #[test]
    fn category_labels_are_lenient() {
        assert_eq!(Category::from_label("Grants"), Some(Category::Grant));
        assert_eq!(Category::from_label(" hackathon "), Some(Category::Hackathon));
        assert_eq!(Category::from_label("job"), Some(Category::Bounty));
        assert_eq!(Category::from_label("meetup"), None);
        assert_eq!(Category::infer("Join our incentivized TESTNET"), Category::Testnet);
        assert_eq!(Category::infer("ecosystem fund"), Category::Grant);
    }

    #[test]
    fn placeholder_reward_and_unknown_chain_are_detected() {
        let mut c = Candidate::new("Devpost", "Hack");
        assert!(c.reward_is_placeholder());
        c.reward_pool = Some("TBA".into());
        assert!(c.reward_is_placeholder());
        c.reward_pool = Some("$5,000".into());
        assert!(!c.reward_is_placeholder());
        c.chain = Some("Unknown".into());
        assert!(c.chain_is_unknown());
    }

    #[test]
    fn dedup_blob_truncates_description() {
        let mut c = Candidate::new("Reddit", "Title");
        c.description = "x".repeat(500);
        assert_eq!(c.dedup_blob().len(), "Title ".len() + DEDUP_BLOB_DESCRIPTION_CHARS);
        assert_eq!(dedup_blob("Title", ""), "Title");
    }

    #[test]
    fn records_and_candidates_share_the_dedup_blob() {
        let mut existing = record();
        existing.description = "Open call for builders. ".repeat(20);
        let mut candidate = Candidate::new("Y", &existing.title);
        candidate.description = existing.description.clone();
        assert_eq!(existing.dedup_blob(), candidate.dedup_blob());
    }

    #[test]
    fn patch_fills_blanks_but_never_clears() {
        let mut existing = record();
        let deadline = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();
        let mut candidate = Candidate::new("Y", "Grant for DeFi tooling");
        candidate.reward_pool = Some("$5,000".into());
        candidate.deadline = Some(deadline);

        let patch = MissingFieldPatch::between(&existing, &candidate).expect("patch");
        assert!(existing.apply_patch(&patch));
        assert_eq!(existing.reward_pool.as_deref(), Some("$5,000"));
        assert_eq!(existing.deadline, Some(deadline));

        let empty = Candidate::new("Y", "Grant for DeFi tooling");
        assert!(MissingFieldPatch::between(&existing, &empty).is_none());
        assert!(!existing.apply_patch(&MissingFieldPatch::default()));
        assert_eq!(existing.reward_pool.as_deref(), Some("$5,000"));
        assert_eq!(existing.deadline, Some(deadline));
    }

    #[test]
    fn clamp_score_bounds() {
        assert_eq!(clamp_score(-20), 0);
        assert_eq!(clamp_score(250), 100);
        assert_eq!(clamp_score(42), 42);
    }
}
