use async_trait::async_trait;
use oppscout_core::text::{extract_chain, parse_date_loose};
use oppscout_core::{Candidate, Category};
use scraper::Html;

use super::load_listings;
use crate::html::{absolutize, cards, first_attr, first_text, last_path_segment};
use crate::raw::Code4renaContest;
use crate::registry::SourceConfig;
use crate::{AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &["https://code4rena.com/audits"];

pub struct Code4renaFetcher {
    config: SourceConfig,
}

impl Code4renaFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

pub(crate) fn scrape_contests(html: &str, base_url: &str) -> Result<Vec<Code4renaContest>, AdapterError> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for card in cards(&document, ".contest-card")? {
        let Some(title) = first_text(card, "h3")? else {
            continue;
        };
        let url = match first_attr(card, "a[href]", "href")? {
            Some(href) => absolutize(base_url, &href),
            None => base_url.to_string(),
        };
        out.push(Code4renaContest {
            title,
            url,
            prize: first_text(card, ".prize-amount, .amount")?,
            description: first_text(card, "p")?,
            end_date: first_text(card, ".end-date, time")?,
        });
    }
    Ok(out)
}

fn contest_to_candidate(contest: Code4renaContest) -> Candidate {
    let description = contest.description.unwrap_or_else(|| {
        format!("Competitive security audit for {} on Code4rena.", contest.title)
    });
    Candidate {
        source_native_id: last_path_segment(&contest.url),
        chain: Some(extract_chain(&contest.title).unwrap_or_else(|| "Multi-chain".to_string())),
        reward_pool: Some(contest.prize.unwrap_or_else(|| "TBD".to_string())),
        deadline: contest.end_date.as_deref().and_then(parse_date_loose),
        title: contest.title,
        description,
        url: contest.url,
        source: "Code4rena".to_string(),
        category: Some(Category::Bounty),
        tags: vec!["Security".into(), "Audit".into(), "Code4rena".into()],
        required_skills: Vec::new(),
        is_verified: false,
    }
}

#[async_trait]
impl SourceFetcher for Code4renaFetcher {
    fn source_id(&self) -> &'static str {
        "code4rena"
    }

    fn source_name(&self) -> &'static str {
        "Code4rena"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::PublicHtml
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.html", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let base = if page.url.is_empty() { DEFAULT_LISTINGS[0] } else { &page.url };
            items.extend(scrape_contests(&page.body, base)?.into_iter().map(RawItem::Code4rena));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        raw.into_iter()
            .map(|item| match item {
                RawItem::Code4rena(contest) => Ok(contest_to_candidate(contest)),
                other => Err(AdapterError::ForeignPayload {
                    fetcher: "code4rena",
                    found: other.kind(),
                }),
            })
            .collect()
    }
}
