//! Source-shaped payloads, one variant per fetcher.
//!
//! API-backed sources deserialize straight into these types. HTML-backed sources
//! scrape into them during `fetch`, so `parse` never touches markup.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use oppscout_core::text::parse_date_loose;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawItem {
    Reddit(RedditPost),
    Superteam(SuperteamListing),
    DoraHacks(DoraHacksHackathon),
    Sherlock(SherlockContest),
    Questbook(QuestbookGrant),
    HackQuest(HackQuestHackathon),
    Code4rena(Code4renaContest),
    EthGlobal(EthGlobalEvent),
    Devpost(DevpostTile),
    Manual(ManualEntry),
}

impl RawItem {
    pub fn kind(&self) -> &'static str {
        match self {
            RawItem::Reddit(_) => "reddit",
            RawItem::Superteam(_) => "superteam",
            RawItem::DoraHacks(_) => "dora_hacks",
            RawItem::Sherlock(_) => "sherlock",
            RawItem::Questbook(_) => "questbook",
            RawItem::HackQuest(_) => "hack_quest",
            RawItem::Code4rena(_) => "code4rena",
            RawItem::EthGlobal(_) => "eth_global",
            RawItem::Devpost(_) => "devpost",
            RawItem::Manual(_) => "manual",
        }
    }
}

/// A JSON scalar some APIs send as either a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexibleNumber {
    Number(serde_json::Number),
    Text(String),
}

impl FlexibleNumber {
    pub fn is_blank(&self) -> bool {
        matches!(self, FlexibleNumber::Text(t) if t.trim().is_empty())
    }
}

impl fmt::Display for FlexibleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlexibleNumber::Number(n) => write!(f, "{n}"),
            FlexibleNumber::Text(t) => f.write_str(t.trim()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Millis,
}

/// Either a unix epoch integer or a date string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Epoch(i64),
    Text(String),
}

impl Timestamp {
    pub fn to_datetime(&self, unit: EpochUnit) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Epoch(value) => match unit {
                EpochUnit::Seconds => Utc.timestamp_opt(*value, 0).single(),
                EpochUnit::Millis => Utc.timestamp_millis_opt(*value).single(),
            },
            Timestamp::Text(text) => parse_date_loose(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub created_utc: Option<f64>,
    #[serde(default)]
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RedditListingData {
    #[serde(default)]
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RedditChild {
    pub data: RedditPost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperteamReward {
    #[serde(default)]
    pub amount: Option<FlexibleNumber>,
    #[serde(default)]
    pub value: Option<FlexibleNumber>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Skills come as plain names or as `{ "skills": "Frontend", "subskills": [...] }` groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkillEntry {
    Name(String),
    Group { skills: String },
}

impl SkillEntry {
    pub fn name(&self) -> &str {
        match self {
            SkillEntry::Name(name) => name,
            SkillEntry::Group { skills } => skills,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperteamListing {
    #[serde(default)]
    pub id: Option<FlexibleNumber>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub listing_type: Option<String>,
    #[serde(default)]
    pub rewards: Option<SuperteamReward>,
    #[serde(default)]
    pub reward_amount: Option<FlexibleNumber>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub deadline: Option<Timestamp>,
    #[serde(default)]
    pub skills: Vec<SkillEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SuperteamResponse {
    List(Vec<SuperteamListing>),
    Wrapped {
        #[serde(default, alias = "data")]
        listings: Vec<SuperteamListing>,
    },
}

impl SuperteamResponse {
    pub fn into_listings(self) -> Vec<SuperteamListing> {
        match self {
            SuperteamResponse::List(listings) => listings,
            SuperteamResponse::Wrapped { listings } => listings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoraHacksHackathon {
    #[serde(alias = "id")]
    pub hackathon_id: FlexibleNumber,
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub total_prize: Option<FlexibleNumber>,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DoraHacksResponse {
    #[serde(default)]
    pub data: Vec<DoraHacksHackathon>,
}

/// Audit contest from Sherlock's contest API; amounts are USDC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SherlockContest {
    pub id: FlexibleNumber,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "description")]
    pub short_description: String,
    #[serde(default, alias = "prize")]
    pub prize_pool: Option<FlexibleNumber>,
    #[serde(default, alias = "deadline")]
    pub ends_at: Option<Timestamp>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SherlockResponse {
    List(Vec<SherlockContest>),
    Wrapped {
        #[serde(default)]
        items: Vec<SherlockContest>,
    },
}

impl SherlockResponse {
    pub fn into_contests(self) -> Vec<SherlockContest> {
        match self {
            SherlockResponse::List(contests) => contests,
            SherlockResponse::Wrapped { items } => items,
        }
    }
}

/// Grant funding as `{ "amount": "50,000", "token": "MATIC" }` or a bare figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestbookReward {
    Detailed {
        #[serde(default, alias = "value")]
        amount: Option<FlexibleNumber>,
        #[serde(default, alias = "currency")]
        token: Option<String>,
    },
    Flat(FlexibleNumber),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestbookGrant {
    #[serde(default, alias = "grant_id")]
    pub id: Option<FlexibleNumber>,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default, alias = "summary")]
    pub description: String,
    #[serde(default, alias = "funding")]
    pub reward: Option<QuestbookReward>,
    #[serde(default, alias = "end_date")]
    pub deadline: Option<Timestamp>,
    #[serde(default, alias = "network")]
    pub chain: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum QuestbookResponse {
    List(Vec<QuestbookGrant>),
    Wrapped {
        #[serde(default, alias = "data")]
        grants: Vec<QuestbookGrant>,
    },
}

impl QuestbookResponse {
    pub fn into_grants(self) -> Vec<QuestbookGrant> {
        match self {
            QuestbookResponse::List(grants) => grants,
            QuestbookResponse::Wrapped { grants } => grants,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HackQuestHackathon {
    #[serde(default)]
    pub id: Option<FlexibleNumber>,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "link")]
    pub url: Option<String>,
    #[serde(default, alias = "reward")]
    pub prize: Option<FlexibleNumber>,
    #[serde(default, alias = "end_date")]
    pub deadline: Option<Timestamp>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum HackQuestResponse {
    List(Vec<HackQuestHackathon>),
    Wrapped {
        #[serde(default, alias = "hackathons")]
        data: Vec<HackQuestHackathon>,
    },
}

impl HackQuestResponse {
    pub fn into_hackathons(self) -> Vec<HackQuestHackathon> {
        match self {
            HackQuestResponse::List(hackathons) => hackathons,
            HackQuestResponse::Wrapped { data } => data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code4renaContest {
    pub title: String,
    pub url: String,
    pub prize: Option<String>,
    pub description: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthGlobalEvent {
    pub title: String,
    pub url: String,
    pub date_text: Option<String>,
    pub description: Option<String>,
    pub prize: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevpostTile {
    pub title: String,
    pub url: String,
    pub prize: Option<String>,
    pub themes: Vec<String>,
    pub submission_period: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DevpostTheme {
    pub name: String,
}

/// One entry of Devpost's hackathon search API, the data its listing page renders from.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DevpostApiHackathon {
    pub title: String,
    pub url: String,
    /// Carries inline markup, e.g. `$<span data-currency-value>10,000</span>`.
    #[serde(default)]
    pub prize_amount: Option<String>,
    #[serde(default)]
    pub themes: Vec<DevpostTheme>,
    #[serde(default)]
    pub submission_period_dates: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DevpostApiResponse {
    #[serde(default)]
    pub hackathons: Vec<DevpostApiHackathon>,
}

/// A hand-curated entry; the shape mirrors the candidate fields directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub reward_pool: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superteam_accepts_bare_and_wrapped_lists() {
        let bare: SuperteamResponse =
            serde_json::from_str(r#"[{"id":"a","title":"T","rewards":{"amount":"5,000","token":"USDC"}}]"#)
                .unwrap();
        assert_eq!(bare.into_listings().len(), 1);

        let wrapped: SuperteamResponse =
            serde_json::from_str(r#"{"data":[{"id":7,"title":"T","deadline":1773964800000}]}"#).unwrap();
        let listings = wrapped.into_listings();
        assert_eq!(listings[0].id, Some(FlexibleNumber::Number(7.into())));
        assert_eq!(
            listings[0]
                .deadline
                .as_ref()
                .and_then(|d| d.to_datetime(EpochUnit::Millis))
                .map(|d| d.to_rfc3339()),
            Some("2026-03-20T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn timestamps_accept_epochs_and_text() {
        let secs = Timestamp::Epoch(1_772_668_800);
        assert_eq!(
            secs.to_datetime(EpochUnit::Seconds).map(|d| d.date_naive().to_string()),
            Some("2026-03-05".into())
        );
        let text = Timestamp::Text("2026-03-05T00:00:00Z".into());
        assert_eq!(text.to_datetime(EpochUnit::Seconds), secs.to_datetime(EpochUnit::Seconds));
        assert_eq!(Timestamp::Text("soon".into()).to_datetime(EpochUnit::Millis), None);
    }

    #[test]
    fn skill_entries_read_both_shapes() {
        let skills: Vec<SkillEntry> =
            serde_json::from_str(r#"["Rust", {"skills": "Frontend", "subskills": ["React"]}]"#).unwrap();
        let names: Vec<&str> = skills.iter().map(SkillEntry::name).collect();
        assert_eq!(names, vec!["Rust", "Frontend"]);
    }

    #[test]
    fn questbook_rewards_read_both_shapes() {
        let grants: QuestbookResponse = serde_json::from_str(
            r#"{"grants":[{"id":"a","title":"T","reward":{"amount":"50,000","token":"MATIC"}},
                          {"grant_id":9,"name":"U","funding":25000}]}"#,
        )
        .unwrap();
        let grants = grants.into_grants();
        assert_eq!(
            grants[0].reward,
            Some(QuestbookReward::Detailed {
                amount: Some(FlexibleNumber::Text("50,000".into())),
                token: Some("MATIC".into()),
            })
        );
        assert_eq!(grants[1].id, Some(FlexibleNumber::Number(9.into())));
        assert_eq!(grants[1].reward, Some(QuestbookReward::Flat(FlexibleNumber::Number(25000.into()))));
    }

    #[test]
    fn sherlock_and_hackquest_accept_bare_lists() {
        let contests: SherlockResponse =
            serde_json::from_str(r#"[{"id":142,"title":"Pendle","prize_pool":150000,"ends_at":1773532800}]"#)
                .unwrap();
        assert_eq!(contests.into_contests()[0].prize_pool, Some(FlexibleNumber::Number(150000.into())));

        let hackathons: HackQuestResponse =
            serde_json::from_str(r#"{"hackathons":[{"name":"Sui Overflow","link":"https://x.io/sui"}]}"#).unwrap();
        let hackathons = hackathons.into_hackathons();
        assert_eq!(hackathons[0].title, "Sui Overflow");
        assert_eq!(hackathons[0].url.as_deref(), Some("https://x.io/sui"));
    }

    #[test]
    fn raw_items_are_tagged_by_kind() {
        let item = RawItem::Manual(ManualEntry {
            id: None,
            title: "Grant".into(),
            description: String::new(),
            url: "https://x.org".into(),
            category: None,
            chain: None,
            reward_pool: None,
            deadline: None,
            tags: vec![],
            required_skills: vec![],
        });
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "manual");
        assert_eq!(item.kind(), "manual");
    }
}
