use async_trait::async_trait;
use oppscout_core::{Candidate, Category};
use tracing::warn;

use super::{decode_json, load_listings};
use crate::raw::{EpochUnit, FlexibleNumber, SuperteamListing, SuperteamResponse};
use crate::registry::SourceConfig;
use crate::{non_empty, truncate_chars, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &["https://earn.superteam.fun/api/listings?take=100&isActive=true"];
const LISTING_BASE: &str = "https://earn.superteam.fun/earn/listing";
const DESCRIPTION_CHARS: usize = 500;

pub struct SuperteamFetcher {
    config: SourceConfig,
}

impl SuperteamFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

fn format_reward(listing: &SuperteamListing) -> String {
    let (amount, token) = match &listing.rewards {
        Some(rewards) => (
            rewards.amount.clone().or_else(|| rewards.value.clone()),
            rewards.token.clone(),
        ),
        None => (listing.reward_amount.clone(), listing.token.clone()),
    };
    match amount.filter(|a| !a.is_blank()) {
        Some(amount) => format!("${amount} {}", token.unwrap_or_else(|| "USDC".to_string())),
        None => "TBD".to_string(),
    }
}

fn listing_key(listing: &SuperteamListing) -> Option<String> {
    non_empty(listing.slug.clone()).or_else(|| listing.id.as_ref().map(FlexibleNumber::to_string))
}

fn listing_to_candidate(listing: SuperteamListing) -> Option<Candidate> {
    let key = listing_key(&listing)?;
    let category = listing
        .listing_type
        .as_deref()
        .and_then(Category::from_label)
        .unwrap_or(Category::Bounty);
    let skills: Vec<String> = listing.skills.iter().map(|s| s.name().to_string()).collect();
    let mut tags = skills.clone();
    tags.extend(["solana".to_string(), "superteam".to_string()]);
    let title = non_empty(Some(listing.title.clone())).unwrap_or_else(|| "Untitled".to_string());

    Some(Candidate {
        title,
        description: truncate_chars(&listing.description, DESCRIPTION_CHARS),
        url: format!("{LISTING_BASE}/{key}"),
        source: "Superteam".to_string(),
        source_native_id: listing.id.as_ref().map(FlexibleNumber::to_string).or(Some(key)),
        category: Some(category),
        chain: Some("Solana".to_string()),
        reward_pool: Some(format_reward(&listing)),
        deadline: listing
            .deadline
            .as_ref()
            .and_then(|d| d.to_datetime(EpochUnit::Millis)),
        tags,
        required_skills: skills,
        is_verified: true,
    })
}

#[async_trait]
impl SourceFetcher for SuperteamFetcher {
    fn source_id(&self) -> &'static str {
        "superteam"
    }

    fn source_name(&self) -> &'static str {
        "Superteam"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.json", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let response: SuperteamResponse = decode_json("Superteam", &page.body)?;
            items.extend(response.into_listings().into_iter().map(RawItem::Superteam));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            let RawItem::Superteam(listing) = item else {
                return Err(AdapterError::ForeignPayload {
                    fetcher: "superteam",
                    found: item.kind(),
                });
            };
            match listing_to_candidate(listing) {
                Some(candidate) => out.push(candidate),
                None => warn!("superteam listing without slug or id skipped"),
            }
        }
        Ok(out)
    }
}
