use async_trait::async_trait;
use oppscout_core::{Candidate, Category};
use tracing::warn;

use super::{decode_json, load_listings};
use crate::raw::{EpochUnit, QuestbookGrant, QuestbookResponse, QuestbookReward};
use crate::registry::SourceConfig;
use crate::{non_empty, truncate_chars, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &["https://api.questbook.app/v1/grants?status=active&limit=100"];
const GRANT_BASE: &str = "https://questbook.app/grant";
const DESCRIPTION_CHARS: usize = 500;

/// Questbook grant programs. Grants are run by the funding DAOs themselves, so they are
/// marked verified.
pub struct QuestbookFetcher {
    config: SourceConfig,
}

impl QuestbookFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

fn format_reward(reward: Option<QuestbookReward>) -> String {
    let (amount, token) = match reward {
        Some(QuestbookReward::Detailed { amount, token }) => (amount, token),
        Some(QuestbookReward::Flat(amount)) => (Some(amount), None),
        None => (None, None),
    };
    match amount.filter(|a| !a.is_blank()) {
        Some(amount) => {
            let token = non_empty(token).unwrap_or_else(|| "USD".to_string());
            format!("{amount} {token}")
        }
        None => "TBD".to_string(),
    }
}

fn grant_to_candidate(id: String, grant: QuestbookGrant) -> Candidate {
    let tags = if grant.tags.is_empty() {
        vec!["grant".to_string(), "questbook".to_string()]
    } else {
        grant.tags
    };
    Candidate {
        title: non_empty(Some(grant.title)).unwrap_or_else(|| "Untitled Grant".to_string()),
        description: truncate_chars(&grant.description, DESCRIPTION_CHARS),
        url: format!("{GRANT_BASE}/{id}"),
        source: "Questbook".to_string(),
        source_native_id: Some(id),
        category: Some(Category::Grant),
        chain: Some(non_empty(grant.chain).unwrap_or_else(|| "Multi-chain".to_string())),
        reward_pool: Some(format_reward(grant.reward)),
        deadline: grant
            .deadline
            .as_ref()
            .and_then(|t| t.to_datetime(EpochUnit::Seconds)),
        tags,
        required_skills: grant.required_skills,
        is_verified: true,
    }
}

#[async_trait]
impl SourceFetcher for QuestbookFetcher {
    fn source_id(&self) -> &'static str {
        "questbook"
    }

    fn source_name(&self) -> &'static str {
        "Questbook"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.json", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let response: QuestbookResponse = decode_json("Questbook", &page.body)?;
            items.extend(response.into_grants().into_iter().map(RawItem::Questbook));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            let RawItem::Questbook(grant) = item else {
                return Err(AdapterError::ForeignPayload {
                    fetcher: "questbook",
                    found: item.kind(),
                });
            };
            match grant.id.as_ref().map(ToString::to_string).filter(|id| !id.is_empty()) {
                Some(id) => out.push(grant_to_candidate(id, grant)),
                None => warn!(title = %grant.title, "questbook grant without id skipped"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::FlexibleNumber;

    fn grant(id: Option<&str>) -> QuestbookGrant {
        QuestbookGrant {
            id: id.map(|id| FlexibleNumber::Text(id.into())),
            title: "Polygon Village Builders".into(),
            description: "x".repeat(700),
            reward: Some(QuestbookReward::Detailed {
                amount: Some(FlexibleNumber::Text("50,000".into())),
                token: Some("MATIC".into()),
            }),
            deadline: None,
            chain: None,
            tags: Vec::new(),
            required_skills: vec!["Solidity".into()],
        }
    }

    #[test]
    fn maps_a_grant() {
        let c = grant_to_candidate("pv-1".into(), grant(Some("pv-1")));
        assert_eq!(c.url, "https://questbook.app/grant/pv-1");
        assert_eq!(c.reward_pool.as_deref(), Some("50,000 MATIC"));
        assert_eq!(c.chain.as_deref(), Some("Multi-chain"));
        assert_eq!(c.tags, vec!["grant", "questbook"]);
        assert_eq!(c.description.chars().count(), DESCRIPTION_CHARS);
        assert!(c.is_verified);
    }

    #[test]
    fn rewards_default_their_token() {
        assert_eq!(
            format_reward(Some(QuestbookReward::Flat(FlexibleNumber::Number(25_000.into())))),
            "25000 USD"
        );
        assert_eq!(
            format_reward(Some(QuestbookReward::Detailed { amount: None, token: Some("OP".into()) })),
            "TBD"
        );
        assert_eq!(format_reward(None), "TBD");
    }

    #[test]
    fn grants_without_an_id_are_skipped() {
        let fetcher = QuestbookFetcher::new(SourceConfig::fixture("questbook", Crawlability::Api));
        let out = fetcher
            .parse(vec![RawItem::Questbook(grant(None)), RawItem::Questbook(grant(Some("pv-1")))])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_native_id.as_deref(), Some("pv-1"));
    }
}
