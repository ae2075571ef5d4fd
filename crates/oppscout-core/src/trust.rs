//! Structural trust heuristic. The only network signal (DNS) is supplied by the caller.

use url::Url;

use crate::{clamp_score, Candidate};

pub const BASE_TRUST: i64 = 80;
pub const MANUAL_SOURCE: &str = "manual";
pub const CURATED_PLATFORMS: &[&str] = &["gitcoin", "devpost", "devfolio"];
pub const RISK_KEYWORDS: &[&str] = &[
    "guaranteed",
    "doubler",
    "invest now",
    "send money",
    "seed phrase",
];
pub const INVITE_LINK_MARKERS: &[&str] = &[
    "t.me/",
    "discord.gg",
    "discord.com/invite",
    "chat.whatsapp.com",
];

const CURATED_BONUS: i64 = 10;
const SPARSE_DESCRIPTION_CHARS: usize = 50;
const SPARSE_DESCRIPTION_PENALTY: i64 = 15;
const INVITE_LINK_PENALTY: i64 = 5;
const RISK_KEYWORD_PENALTY: i64 = 40;
const UNRESOLVED_HOST_PENALTY: i64 = 30;

pub fn is_manual_source(source: &str) -> bool {
    source.trim().eq_ignore_ascii_case(MANUAL_SOURCE)
}

/// Score a candidate in `0..=100`. `host_resolves` is the outcome of a bounded DNS lookup.
pub fn compute_trust(candidate: &Candidate, host_resolves: bool) -> u8 {
    if is_manual_source(&candidate.source) {
        return 100;
    }

    let mut score = BASE_TRUST;
    let source = candidate.source.trim().to_ascii_lowercase();
    if CURATED_PLATFORMS.contains(&source.as_str()) {
        score += CURATED_BONUS;
    }
    if candidate.description.trim().chars().count() < SPARSE_DESCRIPTION_CHARS {
        score -= SPARSE_DESCRIPTION_PENALTY;
    }
    if is_invite_link(&candidate.url) {
        score -= INVITE_LINK_PENALTY;
    }
    if has_risk_keyword(&candidate.title) {
        score -= RISK_KEYWORD_PENALTY;
    }
    if !host_resolves {
        score -= UNRESOLVED_HOST_PENALTY;
    }
    clamp_score(score)
}

pub fn is_invite_link(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    INVITE_LINK_MARKERS.iter().any(|marker| lower.contains(marker))
}

pub fn has_risk_keyword(title: &str) -> bool {
    let lower = title.to_lowercase();
    RISK_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Host component of `url`, if it parses as an absolute URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .filter(|host| !host.is_empty())
}
