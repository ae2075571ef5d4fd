use async_trait::async_trait;
use oppscout_core::{Candidate, Category};

use super::{decode_json, load_listings, slugify};
use crate::raw::{EpochUnit, FlexibleNumber, HackQuestHackathon, HackQuestResponse};
use crate::registry::SourceConfig;
use crate::{non_empty, truncate_chars, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &["https://api.hackquest.io/v1/hackathons?status=ongoing"];
const HACKATHON_BASE: &str = "https://www.hackquest.io/en/hackathon";
const DESCRIPTION_CHARS: usize = 500;

pub struct HackQuestFetcher {
    config: SourceConfig,
}

impl HackQuestFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

fn format_prize(prize: Option<FlexibleNumber>) -> String {
    match prize.filter(|p| !p.is_blank()) {
        Some(FlexibleNumber::Number(n)) => format!("${n}"),
        Some(text) => text.to_string(),
        None => "TBD".to_string(),
    }
}

fn hackathon_to_candidate(h: HackQuestHackathon) -> Candidate {
    let title = non_empty(Some(h.title)).unwrap_or_else(|| "Untitled Hackathon".to_string());
    let url = non_empty(h.url).unwrap_or_else(|| format!("{HACKATHON_BASE}/{}", slugify(&title)));
    let native_id = h
        .id
        .as_ref()
        .map(ToString::to_string)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| title.clone());
    Candidate {
        description: truncate_chars(&h.description, DESCRIPTION_CHARS),
        url,
        source: "HackQuest".to_string(),
        source_native_id: Some(native_id),
        category: Some(Category::Hackathon),
        chain: Some(non_empty(h.chain).unwrap_or_else(|| "Multi-chain".to_string())),
        reward_pool: Some(format_prize(h.prize)),
        deadline: h.deadline.as_ref().and_then(|t| t.to_datetime(EpochUnit::Millis)),
        tags: vec!["hackathon".to_string(), "hackquest".to_string(), "web3".to_string()],
        required_skills: Vec::new(),
        is_verified: false,
        title,
    }
}

#[async_trait]
impl SourceFetcher for HackQuestFetcher {
    fn source_id(&self) -> &'static str {
        "hackquest"
    }

    fn source_name(&self) -> &'static str {
        "HackQuest"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.json", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let response: HackQuestResponse = decode_json("HackQuest", &page.body)?;
            items.extend(response.into_hackathons().into_iter().map(RawItem::HackQuest));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        raw.into_iter()
            .map(|item| match item {
                RawItem::HackQuest(h) => Ok(hackathon_to_candidate(h)),
                other => Err(AdapterError::ForeignPayload {
                    fetcher: "hackquest",
                    found: other.kind(),
                }),
            })
            .collect()
    }
}
