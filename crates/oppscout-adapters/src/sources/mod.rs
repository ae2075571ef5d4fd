pub mod code4rena;
pub mod devpost;
pub mod dorahacks;
pub mod ethglobal;
pub mod hackquest;
pub mod manual;
pub mod questbook;
pub mod reddit;
pub mod sherlock;
pub mod superteam;

use chrono::{DateTime, Utc};
use oppscout_core::text::parse_date_loose;
use tracing::warn;

use crate::registry::{SourceConfig, SourceMode};
use crate::{AdapterError, FetchContext};

/// One fetched listing page.
#[derive(Debug, Clone)]
pub(crate) struct Listing {
    pub url: String,
    pub body: String,
}

pub(crate) fn listing_urls<'a>(config: &'a SourceConfig, defaults: &'a [&'a str]) -> Vec<&'a str> {
    if config.listing_urls.is_empty() {
        defaults.to_vec()
    } else {
        config.listing_urls.iter().map(String::as_str).collect()
    }
}

pub(crate) async fn read_fixture(
    ctx: &FetchContext,
    source_id: &str,
    file: &str,
) -> Result<String, AdapterError> {
    let path = ctx.fixture_path(source_id, file);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| AdapterError::Fixture {
            path: path.display().to_string(),
            source,
        })
}

/// Fixture mode yields the single checked-in page; live mode GETs every listing URL.
/// A live page that fails is skipped unless every page fails.
pub(crate) async fn load_listings(
    ctx: &FetchContext,
    config: &SourceConfig,
    fixture_file: &str,
    defaults: &[&str],
) -> Result<Vec<Listing>, AdapterError> {
    let urls = listing_urls(config, defaults);
    if config.mode == SourceMode::Fixture {
        let body = read_fixture(ctx, &config.source_id, fixture_file).await?;
        let url = urls.first().copied().unwrap_or_default().to_string();
        return Ok(vec![Listing { url, body }]);
    }

    let mut pages = Vec::with_capacity(urls.len());
    let mut last_error = None;
    for url in urls {
        match ctx.http.fetch_text(ctx.run_id, &config.source_id, url).await {
            Ok(body) => pages.push(Listing {
                url: url.to_string(),
                body,
            }),
            Err(err) => {
                warn!(source = %config.source_id, url, error = %err, "listing page failed");
                last_error = Some(err);
            }
        }
    }
    match (pages.is_empty(), last_error) {
        (true, Some(err)) => Err(err.into()),
        _ => Ok(pages),
    }
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    source_name: &'static str,
    body: &str,
) -> Result<T, AdapterError> {
    serde_json::from_str(body).map_err(|err| AdapterError::Decode {
        source_name,
        message: err.to_string(),
    })
}

/// Lowercase ASCII slug with runs of anything else collapsed to one `-`.
pub(crate) fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// End date of a range such as "Mar 1 – 3, 2026" or "Feb 28 - Mar 2, 2026".
pub(crate) fn parse_event_end(date_text: &str) -> Option<DateTime<Utc>> {
    let text = date_text.trim();
    let split = text
        .split_once('–')
        .or_else(|| text.split_once(" - "));
    let Some((left, right)) = split else {
        return parse_date_loose(text);
    };
    let right = right.trim();
    if right.starts_with(|c: char| c.is_ascii_digit()) {
        let month = left.split_whitespace().next().unwrap_or_default();
        parse_date_loose(&format!("{month} {right}"))
    } else {
        parse_date_loose(right)
    }
}
