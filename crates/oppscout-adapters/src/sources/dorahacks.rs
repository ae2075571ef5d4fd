use async_trait::async_trait;
use oppscout_core::{Candidate, Category};

use super::{decode_json, load_listings};
use crate::raw::{DoraHacksHackathon, DoraHacksResponse, EpochUnit};
use crate::registry::SourceConfig;
use crate::{non_empty, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] =
    &["https://dorahacks.io/api/hackathon/list?page=1&size=20&sort=latest&status=active"];
const HACKATHON_BASE: &str = "https://dorahacks.io/hackathon";
const TAG_CHAINS: &[&str] = &["Ethereum", "Solana", "Polygon", "Avalanche", "BNB", "Arbitrum"];

pub struct DoraHacksFetcher {
    config: SourceConfig,
}

impl DoraHacksFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

fn chain_from_tags(tags: &[String]) -> String {
    tags.iter()
        .find_map(|tag| {
            let tag = tag.to_lowercase();
            TAG_CHAINS
                .iter()
                .find(|chain| tag.contains(&chain.to_lowercase()))
        })
        .map(|chain| chain.to_string())
        .unwrap_or_else(|| "Multi-chain".to_string())
}

fn hackathon_to_candidate(h: DoraHacksHackathon) -> Candidate {
    let id = h.hackathon_id.to_string();
    let reward = h
        .total_prize
        .filter(|p| !p.is_blank())
        .map(|p| p.to_string())
        .unwrap_or_else(|| "TBD".to_string());
    Candidate {
        title: non_empty(h.name).unwrap_or_else(|| "Untitled Hackathon".to_string()),
        description: h.description,
        url: format!("{HACKATHON_BASE}/{id}"),
        source: "DoraHacks".to_string(),
        source_native_id: Some(id),
        category: Some(Category::Hackathon),
        chain: Some(chain_from_tags(&h.tags)),
        reward_pool: Some(reward),
        deadline: h.end_time.as_ref().and_then(|t| t.to_datetime(EpochUnit::Seconds)),
        tags: h.tags,
        required_skills: Vec::new(),
        is_verified: false,
    }
}

#[async_trait]
impl SourceFetcher for DoraHacksFetcher {
    fn source_id(&self) -> &'static str {
        "dorahacks"
    }

    fn source_name(&self) -> &'static str {
        "DoraHacks"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.json", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let response: DoraHacksResponse = decode_json("DoraHacks", &page.body)?;
            items.extend(response.data.into_iter().map(RawItem::DoraHacks));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        raw.into_iter()
            .map(|item| match item {
                RawItem::DoraHacks(h) => Ok(hackathon_to_candidate(h)),
                other => Err(AdapterError::ForeignPayload {
                    fetcher: "dorahacks",
                    found: other.kind(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_comes_from_the_first_matching_tag() {
        let tags = vec!["DeFi".to_string(), "solana-mobile".to_string(), "Ethereum".to_string()];
        assert_eq!(chain_from_tags(&tags), "Solana");
        assert_eq!(chain_from_tags(&["Oracle".to_string()]), "Multi-chain");
    }
}
