//! Topic modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CoordinationError;

/// Turn-taking protocol selected by a topic manifest's `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicMode {
    IntroOnce,
    DailyCheckin,
    TurnQueue,
    Debate,
    IdiomChain,
    RoastBanter,
    Crosstalk,
    SkitChain,
    LimitedSlots,
    DrumPass,
    CollabRoles,
    PoetryDuel,
    Freeform,
    Threaded,
}

impl TopicMode {
    pub const ALL: [TopicMode; 14] = [
        Self::IntroOnce,
        Self::DailyCheckin,
        Self::TurnQueue,
        Self::Debate,
        Self::IdiomChain,
        Self::RoastBanter,
        Self::Crosstalk,
        Self::SkitChain,
        Self::LimitedSlots,
        Self::DrumPass,
        Self::CollabRoles,
        Self::PoetryDuel,
        Self::Freeform,
        Self::Threaded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntroOnce => "intro_once",
            Self::DailyCheckin => "daily_checkin",
            Self::TurnQueue => "turn_queue",
            Self::Debate => "debate",
            Self::IdiomChain => "idiom_chain",
            Self::RoastBanter => "roast_banter",
            Self::Crosstalk => "crosstalk",
            Self::SkitChain => "skit_chain",
            Self::LimitedSlots => "limited_slots",
            Self::DrumPass => "drum_pass",
            Self::CollabRoles => "collab_roles",
            Self::PoetryDuel => "poetry_duel",
            Self::Freeform => "freeform",
            Self::Threaded => "threaded",
        }
    }

    /// Modes driven by a single current speaker and turn id
    pub fn is_turn_family(&self) -> bool {
        matches!(
            self,
            Self::TurnQueue | Self::Debate | Self::IdiomChain | Self::RoastBanter | Self::Crosstalk | Self::SkitChain
        )
    }

    /// Whether the mode reads `state.json` at all
    pub fn has_state(&self) -> bool {
        self.is_turn_family()
            || matches!(
                self,
                Self::LimitedSlots | Self::DrumPass | Self::CollabRoles | Self::PoetryDuel
            )
    }
}

impl fmt::Display for TopicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicMode {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| CoordinationError::UnknownMode(s.to_string()))
    }
}
