use async_trait::async_trait;
use oppscout_core::{Candidate, Category};
use tracing::debug;

use super::{decode_json, load_listings};
use crate::raw::{EpochUnit, FlexibleNumber, SherlockContest, SherlockResponse};
use crate::registry::SourceConfig;
use crate::{truncate_chars, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &["https://mainnet-contest.sherlock.xyz/contests?page=1&per_page=20"];
const CONTEST_BASE: &str = "https://audits.sherlock.xyz/contests";
const DESCRIPTION_CHARS: usize = 500;

/// Sherlock audit contests, listed as security bounties on Ethereum.
pub struct SherlockFetcher {
    config: SourceConfig,
}

impl SherlockFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

fn is_finished(contest: &SherlockContest) -> bool {
    contest
        .status
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("finished"))
}

fn format_prize(prize: Option<FlexibleNumber>) -> String {
    match prize.filter(|p| !p.is_blank()) {
        Some(FlexibleNumber::Number(n)) => format!("{n} USDC"),
        Some(text) => text.to_string(),
        None => "TBD".to_string(),
    }
}

fn contest_to_candidate(contest: SherlockContest) -> Candidate {
    let id = contest.id.to_string();
    let description = if contest.short_description.trim().is_empty() {
        format!("Sherlock audit contest: {}", contest.title)
    } else {
        truncate_chars(&contest.short_description, DESCRIPTION_CHARS)
    };
    Candidate {
        description,
        url: format!("{CONTEST_BASE}/{id}"),
        source: "Sherlock".to_string(),
        source_native_id: Some(id),
        category: Some(Category::Bounty),
        chain: Some("Ethereum".to_string()),
        reward_pool: Some(format_prize(contest.prize_pool)),
        deadline: contest
            .ends_at
            .as_ref()
            .and_then(|t| t.to_datetime(EpochUnit::Seconds)),
        tags: vec!["Security".to_string(), "Audit".to_string(), "Sherlock".to_string()],
        required_skills: Vec::new(),
        is_verified: false,
        title: contest.title,
    }
}

#[async_trait]
impl SourceFetcher for SherlockFetcher {
    fn source_id(&self) -> &'static str {
        "sherlock"
    }

    fn source_name(&self) -> &'static str {
        "Sherlock"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.json", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let response: SherlockResponse = decode_json("Sherlock", &page.body)?;
            items.extend(response.into_contests().into_iter().map(RawItem::Sherlock));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            let RawItem::Sherlock(contest) = item else {
                return Err(AdapterError::ForeignPayload {
                    fetcher: "sherlock",
                    found: item.kind(),
                });
            };
            if is_finished(&contest) {
                debug!(id = %contest.id, "finished contest skipped");
                continue;
            }
            out.push(contest_to_candidate(contest));
        }
        Ok(out)
    }
}
