//! Typed mode parameters from a topic manifest's `rules` map

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::error::CoordinationError;
use super::mode::TopicMode;

fn default_card_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_quota() -> u32 {
    1
}

fn default_proposal_types() -> Vec<String> {
    vec!["topic".to_string(), "task".to_string()]
}

fn default_judge_mode() -> String {
    "judge".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntroRules {
    #[serde(default = "default_card_version")]
    pub card_version: u32,
    /// When false an agent introduces itself once, whatever the card version
    #[serde(default = "default_true")]
    pub allow_reintro: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawDailyRules {
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_quota")]
    proposal_quota: u32,
    #[serde(default = "default_proposal_types")]
    proposal_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyRules {
    pub timezone: Tz,
    /// Proposals (of any allowed type) per agent per local day
    pub proposal_quota: u32,
    /// Allowed proposal types, e.g. `topic`, `task`
    pub proposal_types: Vec<String>,
}

impl DailyRules {
    /// Local calendar date of `now` in the topic's timezone
    pub fn local_date(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.timezone).format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlotRules {
    pub slots_max: u32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoleRules {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DuelRules {
    /// `vote` or `hybrid` lets participants vote on rounds
    #[serde(default = "default_judge_mode")]
    pub judge_mode: String,
}

impl DuelRules {
    pub fn voting_enabled(&self) -> bool {
        matches!(self.judge_mode.as_str(), "vote" | "hybrid")
    }
}

/// Parameters for one mode
#[derive(Debug, Clone, PartialEq)]
pub enum ModeRules {
    Intro(IntroRules),
    Daily(DailyRules),
    Turn,
    Slots(SlotRules),
    Drum,
    Roles(RoleRules),
    Duel(DuelRules),
    Freeform,
}

fn decode<T: DeserializeOwned>(mode: TopicMode, rules: &Value) -> Result<T, CoordinationError> {
    let rules = if rules.is_null() {
        Value::Object(Default::default())
    } else {
        rules.clone()
    };
    serde_json::from_value(rules).map_err(|e| CoordinationError::InvalidRules(format!("{}: {}", mode, e)))
}

impl ModeRules {
    pub fn parse(mode: TopicMode, rules: &Value) -> Result<Self, CoordinationError> {
        let parsed = match mode {
            TopicMode::IntroOnce => Self::Intro(decode(mode, rules)?),
            TopicMode::DailyCheckin => {
                let raw: RawDailyRules = decode(mode, rules)?;
                let timezone = raw.timezone.parse::<Tz>().map_err(|e| {
                    CoordinationError::InvalidRules(format!("unknown timezone '{}': {}", raw.timezone, e))
                })?;
                Self::Daily(DailyRules {
                    timezone,
                    proposal_quota: raw.proposal_quota,
                    proposal_types: raw.proposal_types,
                })
            }
            TopicMode::LimitedSlots => {
                let slots: SlotRules = decode(mode, rules)?;
                if slots.slots_max == 0 {
                    return Err(CoordinationError::InvalidRules("slots_max must be positive".into()));
                }
                Self::Slots(slots)
            }
            TopicMode::DrumPass => Self::Drum,
            TopicMode::CollabRoles => {
                let roles: RoleRules = decode(mode, rules)?;
                if roles.roles.is_empty() {
                    return Err(CoordinationError::InvalidRules("collab_roles needs at least one role".into()));
                }
                Self::Roles(roles)
            }
            TopicMode::PoetryDuel => Self::Duel(decode(mode, rules)?),
            TopicMode::Freeform | TopicMode::Threaded => Self::Freeform,
            TopicMode::TurnQueue
            | TopicMode::Debate
            | TopicMode::IdiomChain
            | TopicMode::RoastBanter
            | TopicMode::Crosstalk
            | TopicMode::SkitChain => Self::Turn,
        };
        Ok(parsed)
    }
}
