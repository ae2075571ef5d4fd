use serde::{Deserialize, Serialize};

use crate::sources::{
    code4rena::Code4renaFetcher, devpost::DevpostFetcher, dorahacks::DoraHacksFetcher,
    ethglobal::EthGlobalFetcher, hackquest::HackQuestFetcher, manual::ManualFetcher,
    questbook::QuestbookFetcher, reddit::RedditFetcher, sherlock::SherlockFetcher,
    superteam::SuperteamFetcher,
};
use crate::{Crawlability, SourceFetcher};

/// Whether a fetcher reads the network or its checked-in fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Live,
    Fixture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub crawlability: Crawlability,
    #[serde(default)]
    pub mode: SourceMode,
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceConfig {
    pub fn fixture(source_id: &str, crawlability: Crawlability) -> Self {
        Self {
            source_id: source_id.to_string(),
            display_name: source_id.to_string(),
            enabled: true,
            crawlability,
            mode: SourceMode::Fixture,
            listing_urls: Vec::new(),
            notes: None,
        }
    }
}

pub fn fetcher_for_source(config: &SourceConfig) -> Option<Box<dyn SourceFetcher>> {
    let config = config.clone();
    match config.source_id.as_str() {
        "reddit" => Some(Box::new(RedditFetcher::new(config))),
        "superteam" => Some(Box::new(SuperteamFetcher::new(config))),
        "dorahacks" => Some(Box::new(DoraHacksFetcher::new(config))),
        "code4rena" => Some(Box::new(Code4renaFetcher::new(config))),
        "ethglobal" => Some(Box::new(EthGlobalFetcher::new(config))),
        "devpost" => Some(Box::new(DevpostFetcher::new(config))),
        "sherlock" => Some(Box::new(SherlockFetcher::new(config))),
        "questbook" => Some(Box::new(QuestbookFetcher::new(config))),
        "hackquest" => Some(Box::new(HackQuestFetcher::new(config))),
        "manual" => Some(Box::new(ManualFetcher::new(config))),
        _ => None,
    }
}
