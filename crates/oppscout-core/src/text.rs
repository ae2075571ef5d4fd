//! Pure text normalization and pattern extraction.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Query keys containing any of these substrings are dropped by [`normalize_url`].
pub const TRACKING_PARAM_MARKERS: &[&str] = &["utm_", "fbclid", "ref", "source", "trk"];

pub const SKILL_VOCABULARY: &[&str] = &[
    "Rust",
    "Solidity",
    "Python",
    "TypeScript",
    "React",
    "Next.js",
    "Go",
    "C++",
    "Move",
    "Cairo",
    "Vyper",
    "ZK",
    "Zero Knowledge",
    "DeFi",
    "NFT",
    "DAO",
    "Smart Contract",
    "Frontend",
    "Backend",
    "Fullstack",
    "Mobile",
    "iOS",
    "Android",
];

// "Base" is left out: it collides with too much ordinary prose.
pub const CHAIN_VOCABULARY: &[&str] = &[
    "Ethereum",
    "Solana",
    "Arbitrum",
    "Optimism",
    "Polygon",
    "Sui",
    "Aptos",
    "Berachain",
    "Monad",
    "Starknet",
    "zkSync",
    "Avalanche",
    "Cosmos",
    "Celestia",
    "BNB",
];

const DEADLINE_LABEL: &str = r"(?:deadline|closing|apply by|ends|until)";

static DEADLINE_ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i){DEADLINE_LABEL}:?\s*(\d{{4}})-(\d{{2}})-(\d{{2}})"))
        .expect("valid deadline iso regex")
});
static DEADLINE_SLASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i){DEADLINE_LABEL}:?\s*(\d{{1,2}})/(\d{{1,2}})/(\d{{4}})"))
        .expect("valid deadline slash regex")
});
static DEADLINE_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i){DEADLINE_LABEL}:?\s*([a-z]{{3,9}})\.?\s(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s?(\d{{4}}))?"
    ))
    .expect("valid deadline month-day regex")
});
static DEADLINE_DUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)due:?\s*([a-z]{3,9})\.?\s(\d{1,2})\b").expect("valid due-date regex")
});

static REWARD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\$\d[\d,]*(?:\.\d+)?(?:[kmb]\b)?",
        r"(?i)\d[\d,]*(?:\.\d+)?\s?(?:USDC|USDT|ETH|SOL|BTC|tokens)\b",
        r"(?i)prize pool:?\s?\$?\d[\d,]*(?:\.\d+)?(?:[kmb]\b)?",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid reward regex"))
    .collect()
});

/// Canonical URL form used as a uniqueness key.
///
/// Input that does not parse as an absolute URL with a host is returned unchanged.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Ok(parsed) = Url::parse(trimmed) else {
        return raw.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return raw.to_string();
    };

    let scheme = if parsed.scheme() == "http" { "http" } else { "https" };
    let host = host.to_ascii_lowercase();
    let mut host = host.as_str();
    while let Some(rest) = host.strip_prefix("www.") {
        if rest.is_empty() {
            break;
        }
        host = rest;
    }

    let default_port = if scheme == "http" { 80 } else { 443 };
    let port = parsed
        .port()
        .filter(|port| *port != default_port)
        .map(|port| format!(":{port}"))
        .unwrap_or_default();

    let path = parsed.path().trim_end_matches('/');

    let kept: Vec<&str> = parsed
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default().to_ascii_lowercase();
            !TRACKING_PARAM_MARKERS
                .iter()
                .any(|marker| key.contains(marker))
        })
        .collect();

    let mut out = format!("{scheme}://{host}{port}{path}");
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    out
}

/// SHA-256 over lowercased ASCII alphanumerics. Empty text hashes to `""`.
pub fn content_hash(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if cleaned.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(cleaned.as_bytes()))
}

pub fn extract_deadline(text: &str) -> Option<DateTime<Utc>> {
    extract_deadline_at(text, Utc::now().date_naive())
}

/// First labeled date in `text`, resolving year-less dates relative to `today`.
pub fn extract_deadline_at(text: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(caps) = DEADLINE_ISO.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        if let Some(date) = date {
            return Some(midnight_utc(date));
        }
    }

    if let Some(caps) = DEADLINE_SLASH.captures(text) {
        let month = caps[1].parse().ok();
        let day = caps[2].parse().ok();
        let year = caps[3].parse().ok();
        if let (Some(month), Some(day), Some(year)) = (month, day, year) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(midnight_utc(date));
            }
        }
    }

    for caps in DEADLINE_MONTH_DAY.captures_iter(text) {
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        if let Some(date) = month_day_date(&caps[1], &caps[2], year, today) {
            return Some(midnight_utc(date));
        }
    }

    for caps in DEADLINE_DUE.captures_iter(text) {
        if let Some(date) = month_day_date(&caps[1], &caps[2], None, today) {
            return Some(midnight_utc(date));
        }
    }

    None
}

fn month_day_date(month: &str, day: &str, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    let month = month_number(month)?;
    let day: u32 = day.parse().ok()?;
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => Some(date),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
            }
        }
    }
}

fn month_number(word: &str) -> Option<u32> {
    let lower = word.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Lenient timestamp parsing for source payloads (RFC 3339, naive datetimes, plain dates).
pub fn parse_date_loose(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(midnight_utc(date));
        }
    }
    None
}

/// First reward-looking amount, upper-cased. Patterns are tried in priority order.
pub fn extract_reward_pool(text: &str) -> Option<String> {
    REWARD_PATTERNS.iter().find_map(|pattern| {
        pattern
            .find(text)
            .map(|m| m.as_str().trim_end_matches(',').trim().to_uppercase())
    })
}

pub fn extract_skills(text: &str) -> BTreeSet<String> {
    let haystack = text.to_ascii_lowercase();
    SKILL_VOCABULARY
        .iter()
        .filter(|skill| find_whole_word(&haystack, &skill.to_ascii_lowercase()).is_some())
        .map(|skill| skill.to_string())
        .collect()
}

/// Earliest chain name mentioned in `text`.
pub fn extract_chain(text: &str) -> Option<String> {
    let haystack = text.to_ascii_lowercase();
    CHAIN_VOCABULARY
        .iter()
        .filter_map(|chain| {
            find_whole_word(&haystack, &chain.to_ascii_lowercase()).map(|pos| (pos, *chain))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, chain)| chain.to_string())
}

/// Case-insensitive whole-word search.
pub fn contains_word(text: &str, needle: &str) -> bool {
    let needle = needle.trim().to_ascii_lowercase();
    !needle.is_empty() && find_whole_word(&text.to_ascii_lowercase(), &needle).is_some()
}

// Both arguments must already be ASCII-lowercased.
fn find_whole_word(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(start);
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

pub fn is_fresh(ts: DateTime<Utc>, cutoff_year: i32) -> bool {
    ts.year() >= cutoff_year
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        midnight_utc(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn normalize_url_strips_tracking_and_www() {
        assert_eq!(
            normalize_url("https://WWW.Example.com/x/?utm_source=a&id=1"),
            "https://example.com/x?id=1"
        );
        assert_eq!(
            normalize_url("https://x.org/grant-for-defi-tooling/?utm_source=twitter"),
            "https://x.org/grant-for-defi-tooling"
        );
        assert_eq!(normalize_url("ftp://files.example.com/a#frag"), "https://files.example.com/a");
        assert_eq!(normalize_url("http://example.com:8080/"), "http://example.com:8080");
        assert_eq!(normalize_url("https://example.com/?ref=abc&fbclid=1&trk=2"), "https://example.com");
    }

    #[test]
    fn normalize_url_leaves_malformed_input_alone() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(normalize_url("example.com/path"), "example.com/path");
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("mailto:team@example.com"), "mailto:team@example.com");
    }

    #[test]
    fn content_hash_ignores_case_and_punctuation() {
        assert_eq!(content_hash("Grant for DeFi!"), content_hash("grant  for defi"));
        assert_eq!(content_hash(""), "");
        assert_eq!(content_hash("?!"), "");
        assert_eq!(content_hash("abc").len(), 64);
    }

    #[test]
    fn deadline_patterns_in_priority_order() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        assert_eq!(
            extract_deadline_at("Deadline: 2026-03-01. Apply now", today),
            Some(date(2026, 3, 1))
        );
        assert_eq!(
            extract_deadline_at("Apply by 07/04/2026", today),
            Some(date(2026, 7, 4))
        );
        assert_eq!(
            extract_deadline_at("Submissions closing: March 15, 2027", today),
            Some(date(2027, 3, 15))
        );
        assert_eq!(extract_deadline_at("no dates here", today), None);
    }

    #[test]
    fn yearless_deadline_rolls_forward_when_passed() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        assert_eq!(
            extract_deadline_at("Ends: June 10", today),
            Some(date(2026, 6, 10))
        );
        assert_eq!(
            extract_deadline_at("Proposals due March 3", today),
            Some(date(2027, 3, 3))
        );
    }

    #[test]
    fn unparseable_deadline_match_is_swallowed() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        assert_eq!(extract_deadline_at("deadline: 2026-13-45", today), None);
        assert_eq!(extract_deadline_at("ends: whenever 12", today), None);
    }

    #[test]
    fn loose_dates() {
        assert_eq!(parse_date_loose("2026-03-01"), Some(date(2026, 3, 1)));
        assert_eq!(parse_date_loose("2026-03-01T00:00:00Z"), Some(date(2026, 3, 1)));
        assert_eq!(parse_date_loose("March 1, 2026"), Some(date(2026, 3, 1)));
        assert_eq!(parse_date_loose("soon"), None);
    }

    #[test]
    fn reward_patterns() {
        assert_eq!(
            extract_reward_pool("Win up to $5,000 in prizes"),
            Some("$5,000".to_string())
        );
        assert_eq!(extract_reward_pool("pool of $1.5m total"), Some("$1.5M".to_string()));
        assert_eq!(extract_reward_pool("Earn 500 usdc"), Some("500 USDC".to_string()));
        assert_eq!(
            extract_reward_pool("Prize pool: 20000 for builders"),
            Some("PRIZE POOL: 20000".to_string())
        );
        assert_eq!(extract_reward_pool("rewards TBD"), None);
    }

    #[test]
    fn skills_match_whole_words_only() {
        let skills = extract_skills("We need Rust and C++ devs, bonus for Next.js; trust us, going fast");
        let expected: BTreeSet<String> = ["C++", "Next.js", "Rust"].iter().map(|s| s.to_string()).collect();
        assert_eq!(skills, expected);
        assert!(extract_skills("zkSync builders").is_empty());
    }

    #[test]
    fn chain_picks_earliest_mention() {
        assert_eq!(
            extract_chain("Build on Solana, later bridging to Ethereum"),
            Some("Solana".to_string())
        );
        assert_eq!(extract_chain("an ecosystem grant"), None);
        assert_eq!(extract_chain("SUI move hackathon"), Some("Sui".to_string()));
    }

    #[test]
    fn contains_word_respects_boundaries() {
        assert!(contains_word("Looking for a Solidity auditor", "solidity"));
        assert!(!contains_word("Gorilla design", "go"));
        assert!(!contains_word("anything", "  "));
    }

    #[test]
    fn freshness_cutoff_is_inclusive() {
        assert!(is_fresh(date(2026, 1, 1), 2026));
        assert!(!is_fresh(date(2025, 12, 31), 2026));
    }
}
