use std::collections::HashSet;

use async_trait::async_trait;
use oppscout_core::{Candidate, Category};
use tracing::debug;

use super::{decode_json, load_listings};
use crate::raw::{RedditListing, RedditPost};
use crate::registry::SourceConfig;
use crate::{truncate_chars, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

const DEFAULT_LISTINGS: &[&str] = &[
    "https://www.reddit.com/r/ethdev/new.json?limit=25",
    "https://www.reddit.com/r/solana/new.json?limit=25",
    "https://www.reddit.com/r/cryptocurrency/new.json?limit=25",
    "https://www.reddit.com/r/rust/new.json?limit=25",
    "https://www.reddit.com/r/web3/new.json?limit=25",
];

/// Posts without one of these are discussion, not opportunities.
const OPPORTUNITY_KEYWORDS: &[&str] = &["hackathon", "grant", "bounty", "apply", "testnet", "airdrop"];

const TITLE_CHARS: usize = 100;
const DESCRIPTION_CHARS: usize = 500;

pub struct RedditFetcher {
    config: SourceConfig,
}

impl RedditFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

fn looks_like_opportunity(post: &RedditPost) -> bool {
    let text = format!("{} {}", post.title, post.selftext).to_lowercase();
    OPPORTUNITY_KEYWORDS.iter().any(|k| text.contains(k))
}

fn chain_for_subreddit(subreddit: &str) -> Option<String> {
    match subreddit.to_ascii_lowercase().as_str() {
        "solana" => Some("Solana".to_string()),
        "ethdev" | "ethereum" => Some("Ethereum".to_string()),
        _ => None,
    }
}

fn post_to_candidate(post: RedditPost) -> Candidate {
    let text = format!("{} {}", post.title, post.selftext);
    let category = Category::infer(&text);
    let description = if post.selftext.trim().is_empty() {
        post.title.clone()
    } else {
        truncate_chars(post.selftext.trim(), DESCRIPTION_CHARS)
    };
    let url = post
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| format!("https://reddit.com{}", post.permalink.as_deref().unwrap_or_default()));

    Candidate {
        title: truncate_chars(post.title.trim(), TITLE_CHARS),
        description,
        url,
        source: "Reddit".to_string(),
        source_native_id: Some(post.id.clone()),
        category: Some(category),
        chain: chain_for_subreddit(&post.subreddit),
        reward_pool: None,
        deadline: None,
        tags: vec![category.to_string(), "Reddit".to_string(), post.subreddit],
        required_skills: Vec::new(),
        is_verified: false,
    }
}

#[async_trait]
impl SourceFetcher for RedditFetcher {
    fn source_id(&self) -> &'static str {
        "reddit"
    }

    fn source_name(&self) -> &'static str {
        "Reddit"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let pages = load_listings(ctx, &self.config, "raw.json", DEFAULT_LISTINGS).await?;
        let mut items = Vec::new();
        for page in pages {
            let listing: RedditListing = decode_json("Reddit", &page.body)?;
            debug!(url = %page.url, posts = listing.data.children.len(), "reddit listing decoded");
            items.extend(listing.data.children.into_iter().map(|c| RawItem::Reddit(c.data)));
        }
        Ok(items)
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in raw {
            let RawItem::Reddit(post) = item else {
                return Err(AdapterError::ForeignPayload {
                    fetcher: "reddit",
                    found: item.kind(),
                });
            };
            if !looks_like_opportunity(&post) || !seen.insert(post.id.clone()) {
                continue;
            }
            out.push(post_to_candidate(post));
        }
        Ok(out)
    }
}
