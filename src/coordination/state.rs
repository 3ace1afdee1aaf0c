//! Topic state as a tagged union
//!
//! `state.json` is written by the actor that advances topics. It is parsed
//! here against the topic's mode; a document of the wrong shape is an
//! [`CoordinationError::InvalidState`], never a silently zeroed default.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::error::CoordinationError;
use super::mode::TopicMode;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnState {
    pub speaker_agent_id: String,
    pub turn_id: String,
    #[serde(default)]
    pub queue: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Slot {
    pub slot_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SlotsState {
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl SlotsState {
    pub fn held_by<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a Slot> + 'a {
        self.slots.iter().filter(move |s| s.agent_id == agent_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DrumState {
    pub holder_agent_id: String,
    pub beat_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoleAssignment {
    pub role: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RolesState {
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
}

impl RolesState {
    pub fn assignment(&self, role: &str) -> Option<&RoleAssignment> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn held_by<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a RoleAssignment> + 'a {
        self.roles
            .iter()
            .filter(move |r| r.agent_id.as_deref() == Some(agent_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelPhase {
    Open,
    Voting,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DuelState {
    pub phase: DuelPhase,
    pub round_id: String,
    /// Empty means any authorized member may take part
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub deadline_at: Option<DateTime<Utc>>,
}

impl DuelState {
    pub fn is_participant(&self, agent_id: &str) -> bool {
        self.participants.is_empty() || self.participants.iter().any(|p| p == agent_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopicState {
    /// Mode keeps no state
    Stateless,
    /// Stateful mode whose state has not been written yet
    NotStarted,
    Turn(TurnState),
    Slots(SlotsState),
    Drum(DrumState),
    Roles(RolesState),
    Duel(DuelState),
}

fn decode<T: DeserializeOwned>(mode: TopicMode, raw: &Value) -> Result<T, CoordinationError> {
    serde_json::from_value(raw.clone()).map_err(|e| CoordinationError::InvalidState(format!("{}: {}", mode, e)))
}

fn require_non_empty(mode: TopicMode, field: &str, value: &str) -> Result<(), CoordinationError> {
    if value.trim().is_empty() {
        return Err(CoordinationError::InvalidState(format!("{}: {} is empty", mode, field)));
    }
    Ok(())
}

impl TopicState {
    /// Parse `raw` (the contents of `state.json`, if any) for `mode`
    pub fn parse(mode: TopicMode, raw: Option<&Value>) -> Result<Self, CoordinationError> {
        if !mode.has_state() {
            return Ok(Self::Stateless);
        }
        let Some(raw) = raw.filter(|v| !v.is_null()) else {
            return Ok(match mode {
                TopicMode::LimitedSlots => Self::Slots(SlotsState::default()),
                TopicMode::CollabRoles => Self::Roles(RolesState::default()),
                _ => Self::NotStarted,
            });
        };

        let state = match mode {
            TopicMode::LimitedSlots => Self::Slots(decode(mode, raw)?),
            TopicMode::CollabRoles => Self::Roles(decode(mode, raw)?),
            TopicMode::DrumPass => {
                let drum: DrumState = decode(mode, raw)?;
                require_non_empty(mode, "holder_agent_id", &drum.holder_agent_id)?;
                require_non_empty(mode, "beat_id", &drum.beat_id)?;
                Self::Drum(drum)
            }
            TopicMode::PoetryDuel => {
                let duel: DuelState = decode(mode, raw)?;
                require_non_empty(mode, "round_id", &duel.round_id)?;
                Self::Duel(duel)
            }
            m if m.is_turn_family() => {
                let turn: TurnState = decode(mode, raw)?;
                require_non_empty(mode, "speaker_agent_id", &turn.speaker_agent_id)?;
                require_non_empty(mode, "turn_id", &turn.turn_id)?;
                Self::Turn(turn)
            }
            _ => Self::Stateless,
        };
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_state_parses() {
        let raw = json!({ "speaker_agent_id": "a1", "turn_id": "t3", "queue": ["a2"], "extra": 1 });
        let state = TopicState::parse(TopicMode::Debate, Some(&raw)).unwrap();
        let TopicState::Turn(turn) = state else {
            panic!("expected turn state");
        };
        assert_eq!(turn.speaker_agent_id, "a1");
        assert_eq!(turn.queue, vec!["a2"]);
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        // turn_id as a number, not silently defaulted
        let raw = json!({ "speaker_agent_id": "a1", "turn_id": 3 });
        assert!(matches!(
            TopicState::parse(TopicMode::TurnQueue, Some(&raw)),
            Err(CoordinationError::InvalidState(_))
        ));

        let raw = json!({ "speaker_agent_id": "", "turn_id": "t1" });
        assert!(matches!(
            TopicState::parse(TopicMode::TurnQueue, Some(&raw)),
            Err(CoordinationError::InvalidState(_))
        ));

        let raw = json!({ "phase": "finished", "round_id": "r1" });
        assert!(matches!(
            TopicState::parse(TopicMode::PoetryDuel, Some(&raw)),
            Err(CoordinationError::InvalidState(_))
        ));
    }

    #[test]
    fn test_absent_state() {
        assert_eq!(
            TopicState::parse(TopicMode::TurnQueue, None).unwrap(),
            TopicState::NotStarted
        );
        assert_eq!(
            TopicState::parse(TopicMode::LimitedSlots, None).unwrap(),
            TopicState::Slots(SlotsState::default())
        );
        assert_eq!(
            TopicState::parse(TopicMode::Freeform, Some(&json!({ "anything": true }))).unwrap(),
            TopicState::Stateless
        );
    }

    #[test]
    fn test_duel_participants() {
        let raw = json!({ "phase": "open", "round_id": "r1", "participants": ["a", "b"] });
        let TopicState::Duel(duel) = TopicState::parse(TopicMode::PoetryDuel, Some(&raw)).unwrap() else {
            panic!("expected duel state");
        };
        assert!(duel.is_participant("a"));
        assert!(!duel.is_participant("c"));
    }
}
