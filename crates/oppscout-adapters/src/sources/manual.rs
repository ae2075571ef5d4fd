use async_trait::async_trait;
use oppscout_core::text::parse_date_loose;
use oppscout_core::{Candidate, Category};
use tracing::warn;

use super::{decode_json, read_fixture};
use crate::raw::ManualEntry;
use crate::registry::{SourceConfig, SourceMode};
use crate::{non_empty, AdapterError, Crawlability, FetchContext, RawItem, SourceFetcher};

/// Hand-curated entries, read from a JSON file or URL.
pub struct ManualFetcher {
    config: SourceConfig,
}

impl ManualFetcher {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    async fn load(&self, ctx: &FetchContext) -> Result<String, AdapterError> {
        let location = self.config.listing_urls.first().map(String::as_str);
        match (self.config.mode, location) {
            (SourceMode::Live, Some(url)) if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(ctx.http.fetch_text(ctx.run_id, &self.config.source_id, url).await?)
            }
            (SourceMode::Live, Some(path)) => {
                let path = ctx.workspace_root.join(path);
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| AdapterError::Fixture {
                        path: path.display().to_string(),
                        source,
                    })
            }
            _ => read_fixture(ctx, &self.config.source_id, "raw.json").await,
        }
    }
}

fn entry_to_candidate(entry: ManualEntry) -> Candidate {
    let text = format!("{} {}", entry.title, entry.description);
    let category = entry
        .category
        .as_deref()
        .and_then(Category::from_label)
        .unwrap_or_else(|| Category::infer(&text));
    let deadline = entry.deadline.as_deref().and_then(|raw| {
        let parsed = parse_date_loose(raw);
        if parsed.is_none() {
            warn!(title = %entry.title, raw, "manual deadline not understood");
        }
        parsed
    });
    Candidate {
        title: entry.title,
        description: entry.description,
        url: entry.url,
        source: "Manual".to_string(),
        source_native_id: non_empty(entry.id),
        category: Some(category),
        chain: non_empty(entry.chain),
        reward_pool: non_empty(entry.reward_pool),
        deadline,
        tags: entry.tags,
        required_skills: entry.required_skills,
        is_verified: true,
    }
}

#[async_trait]
impl SourceFetcher for ManualFetcher {
    fn source_id(&self) -> &'static str {
        "manual"
    }

    fn source_name(&self) -> &'static str {
        "Manual"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Manual
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawItem>, AdapterError> {
        let body = self.load(ctx).await?;
        let entries: Vec<ManualEntry> = decode_json("Manual", &body)?;
        Ok(entries.into_iter().map(RawItem::Manual).collect())
    }

    fn parse(&self, raw: Vec<RawItem>) -> Result<Vec<Candidate>, AdapterError> {
        raw.into_iter()
            .map(|item| match item {
                RawItem::Manual(entry) => Ok(entry_to_candidate(entry)),
                other => Err(AdapterError::ForeignPayload {
                    fetcher: "manual",
                    found: other.kind(),
                }),
            })
            .collect()
    }
}
