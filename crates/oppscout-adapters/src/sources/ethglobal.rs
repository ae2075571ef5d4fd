use async_trait::async_trait;
use chrono::Datelike;
use oppscout_core::{Candidate, Category};
use scraper::Html;
use tracing::debug;

use super::{load_listings, parse_event_end};
use crate::html::{absolutize, cards, first_text, last_path_segment};
use crate::raw::EthGlobalEvent;
use crate::registry::SourceConfig;
use crate::{AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &["https://ethglobal.com/events"];

pub struct EthGlobalFetcher {
    config: SourceConfig,
}

impl EthGlobalFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

/// True when the title names a year before `current_year` ("ETHGlobal Paris 2024").
fn mentions_past_year(title: &str, current_year: i32) -> bool {
    title
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 4)
        .filter_map(|token| token.parse::<i32>().ok())
        .any(|year| (2000..current_year).contains(&year))
}

pub(crate) fn scrape_events(
    html: &str,
    base_url: &str,
    current_year: i32,
) -> Result<Vec<EthGlobalEvent>, AdapterError> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for card in cards(&document, "a[href^='/events/']")? {
        let Some(title) = first_text(card, "h2, h3")? else {
            continue;
        };
        if mentions_past_year(&title, current_year) {
            debug!(%title, "past ethglobal event skipped");
            continue;
        }
        let href = card.value().attr("href").unwrap_or_default();
        out.push(EthGlobalEvent {
            url: absolutize(base_url, href),
            title,
            date_text: first_text(card, ".date, .text-sm")?,
            description: first_text(card, "p")?,
            prize: first_text(card, ".prize")?,
        });
    }
    Ok(out)
}

fn event_to_candidate(event: EthGlobalEvent) -> Candidate {
    let description = event
        .description
        .unwrap_or_else(|| format!("Premier Ethereum hackathon event: {}.", event.title));
    Candidate {
        source_native_id: last_path_segment(&event.url),
        deadline: event.date_text.as_deref().and_then(parse_event_end),
        reward_pool: Some(event.prize.unwrap_or_else(|| "TBD".to_string())),
        title: event.title,
        description,
        url: event.url,
        source: "ETHGlobal".to_string(),
        category: Some(Category::Hackathon),
        chain: Some("Ethereum".to_string()),
        tags: vec!["Ethereum".into(), "Hackathon".into(), "ETHGlobal".into()],
        required_skills: Vec::new(),
        is_verified: false,
    }
}

#[async_trait]
impl SourceFetcher for EthGlobalFetcher {
    fn source_id(&self) -> &'static str {
        "ethglobal"
    }

    fn source_name(&self) -> &'static str {
        "ETHGlobal"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::PublicHtml
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.html", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let base = if page.url.is_empty() { DEFAULT_LISTINGS[0] } else { &page.url };
            let events = scrape_events(&page.body, base, ctx.today.year())?;
            items.extend(events.into_iter().map(RawItem::EthGlobal));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        raw.into_iter()
            .map(|item| match item {
                RawItem::EthGlobal(event) => Ok(event_to_candidate(event)),
                other => Err(AdapterError::ForeignPayload {
                    fetcher: "ethglobal",
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
    fn past_years_are_detected() {
        assert!(mentions_past_year("ETHGlobal Paris 2024", 2026));
        assert!(!mentions_past_year("ETHGlobal London 2026", 2026));
        assert!(!mentions_past_year("ETHGlobal Bangkok", 2026));
        assert!(!mentions_past_year("ETHGlobal 12345", 2026));
    }

    #[test]
    fn scrapes_event_links() {
        let html = r#"
            <a href="/events/london2026"><h3>ETHGlobal London 2026</h3><span class="date">April 10 – 12, 2026</span></a>
            <a href="/events/paris2024"><h3>ETHGlobal Paris 2024</h3></a>
            <a href="/events/"><span>All events</span></a>
        "#;
        let events = scrape_events(html, "https://ethglobal.com/events", 2026).unwrap();
        assert_eq!(events.len(), 1);
        let c = event_to_candidate(events.into_iter().next().unwrap());
        assert_eq!(c.url, "https://ethglobal.com/events/london2026");
        assert_eq!(c.source_native_id.as_deref(), Some("london2026"));
        assert_eq!(c.deadline.map(|d| d.date_naive().to_string()), Some("2026-04-12".into()));
        assert_eq!(c.reward_pool.as_deref(), Some("TBD"));
    }
}
