use async_trait::async_trait;
use oppscout_core::{Candidate, Category};
use scraper::Html;
use tracing::info;
use url::Url;

use super::{decode_json, listing_urls, parse_event_end, read_fixture, slugify, Listing};
use crate::html::{absolutize, all_texts, cards, element_text, first_attr, first_text};
use crate::raw::{DevpostApiHackathon, DevpostApiResponse, DevpostTile};
use crate::registry::{SourceConfig, SourceMode};
use crate::{AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &[
    "https://devpost.com/api/hackathons?search=blockchain&challenge_type[]=online&status[]=open&order_by=deadline",
];
/// Base for links in a server-rendered listing.
const LISTING_PAGE: &str = "https://devpost.com/hackathons";
const MAX_TILES: usize = 10;
const GENERIC_SEGMENTS: &[&str] = &["hackathons", "software", "submission-gallery"];

/// Devpost's listing page is rendered client-side from its search API. Live mode reads that
/// API through a scoped session; server-rendered pages (fixtures, saved listings) are scraped.
pub struct DevpostFetcher {
    config: SourceConfig,
}

impl DevpostFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    async fn load_pages(&self, ctx: &FetchContext) -> Result<Vec<Listing>, AdapterError> {
        let urls = listing_urls(&self.config, DEFAULT_LISTINGS);
        if self.config.mode == SourceMode::Fixture {
            let body = read_fixture(ctx, &self.config.source_id, "raw.html").await?;
            return Ok(vec![Listing {
                url: LISTING_PAGE.to_string(),
                body,
            }]);
        }

        let session = ctx.sessions.acquire(&self.config.source_id).await?;
        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            let body = session.goto(url).await?;
            pages.push(Listing {
                url: url.to_string(),
                body,
            });
        }
        info!(pages = pages.len(), "devpost session finished");
        Ok(pages)
    }
}

/// Hackathon URL without its query, plus a stable id (path tail, or the title slug).
fn canonical_link(url: &str, title: &str) -> (String, String) {
    let Ok(mut parsed) = Url::parse(url) else {
        return (url.to_string(), slugify(title));
    };
    parsed.set_query(None);
    parsed.set_fragment(None);
    let tail = parsed
        .path()
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let id = if tail.len() > 1 && !GENERIC_SEGMENTS.contains(&tail.as_str()) {
        tail
    } else {
        slugify(title)
    };
    (parsed.to_string(), id)
}

fn is_api_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| u.path().starts_with("/api/"))
}

/// Text content of an inline-markup field.
fn strip_markup(fragment: &str) -> Option<String> {
    element_text(Html::parse_fragment(fragment).root_element())
}

fn api_to_tile(h: DevpostApiHackathon) -> DevpostTile {
    DevpostTile {
        title: h.title,
        url: h.url,
        prize: h.prize_amount.as_deref().and_then(strip_markup),
        themes: h.themes.into_iter().map(|t| t.name).collect(),
        submission_period: h.submission_period_dates,
        host: h.organization_name,
    }
}

pub(crate) fn read_api_page(body: &str) -> Result<Vec<DevpostTile>, AdapterError> {
    let response: DevpostApiResponse = decode_json("Devpost", body)?;
    Ok(response
        .hackathons
        .into_iter()
        .take(MAX_TILES)
        .map(api_to_tile)
        .collect())
}

pub(crate) fn scrape_tiles(html: &str, base_url: &str) -> Result<Vec<DevpostTile>, AdapterError> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for tile in cards(&document, ".hackathon-tile")?.into_iter().take(MAX_TILES) {
        let Some(title) = first_text(tile, "h3, .title")? else {
            continue;
        };
        let href = match tile.value().attr("href") {
            Some(href) => Some(href.to_string()),
            None => first_attr(tile, "a[href]", "href")?,
        };
        let Some(href) = href else {
            continue;
        };
        out.push(DevpostTile {
            url: absolutize(base_url, &href),
            prize: first_text(tile, ".prize-amount, .prize")?,
            themes: all_texts(tile, ".theme-label, .tag")?,
            submission_period: first_text(tile, ".submission-period, .deadline")?,
            host: first_text(tile, ".host-label")?,
            title,
        });
    }
    Ok(out)
}

fn tile_to_candidate(tile: DevpostTile) -> Candidate {
    let (url, id) = canonical_link(&tile.url, &tile.title);
    let prize = tile.prize.unwrap_or_else(|| "TBA".to_string());
    let description = format!(
        "Hackathon on Devpost: {}. Prize pool: {}. Themes: {}",
        tile.title,
        prize,
        tile.themes.join(", ")
    );
    let chain = tile
        .themes
        .iter()
        .any(|t| t.eq_ignore_ascii_case("blockchain"))
        .then(|| "Multi-chain".to_string());
    Candidate {
        title: tile.title,
        description,
        url,
        source: "Devpost".to_string(),
        source_native_id: Some(id),
        category: Some(Category::Hackathon),
        chain,
        reward_pool: Some(prize),
        deadline: tile.submission_period.as_deref().and_then(parse_event_end),
        tags: tile.themes,
        required_skills: Vec::new(),
        is_verified: false,
    }
}

#[async_trait]
impl SourceFetcher for DevpostFetcher {
    fn source_id(&self) -> &'static str {
        "devpost"
    }

    fn source_name(&self) -> &'static str {
        "Devpost"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Browser
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let mut items = Vec::new();
        for page in self.load_pages(ctx).await? {
            let tiles = if is_api_url(&page.url) {
                read_api_page(&page.body)?
            } else {
                scrape_tiles(&page.body, &page.url)?
            };
            items.extend(tiles.into_iter().map(RawItem::Devpost));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        raw.into_iter()
            .map(|item| match item {
                RawItem::Devpost(tile) => Ok(tile_to_candidate(tile)),
                other => Err(AdapterError::ForeignPayload {
                    fetcher: "devpost",
                    found: other.kind(),
                }),
            })
            .collect()
    }
}
