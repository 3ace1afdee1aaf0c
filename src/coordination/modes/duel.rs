//! poetry_duel

use chrono::{DateTime, Utc};

use crate::coordination::error::CoordinationError;
use crate::coordination::rules::DuelRules;
use crate::coordination::state::{DuelPhase, DuelState, TopicState};

use super::{Decision, Probe};

fn current(state: &TopicState) -> Result<&DuelState, CoordinationError> {
    match state {
        TopicState::Duel(duel) => Ok(duel),
        TopicState::NotStarted => Err(CoordinationError::NotStarted),
        other => Err(CoordinationError::InvalidState(format!("expected duel state, got {:?}", other))),
    }
}

/// A participant's entry for the open round
pub async fn message(probe: &Probe<'_>, state: &TopicState, now: DateTime<Utc>) -> Decision {
    let duel = current(state)?;
    if duel.phase != DuelPhase::Open {
        return Err(CoordinationError::PhaseClosed);
    }
    if duel.deadline_at.is_some_and(|d| now >= d) {
        return Err(CoordinationError::DeadlinePassed);
    }
    if !duel.is_participant(probe.agent_id) {
        return Err(CoordinationError::NotParticipant);
    }
    probe.fresh_message(&duel.round_id).await
}

pub async fn vote(probe: &Probe<'_>, rules: &DuelRules, state: &TopicState) -> Decision {
    if !rules.voting_enabled() {
        return Err(CoordinationError::VotingDisabled);
    }
    let duel = current(state)?;
    if duel.phase == DuelPhase::Closed {
        return Err(CoordinationError::PhaseClosed);
    }
    probe.fresh_request("vote", &duel.round_id).await
}
