//! Turn family: turn_queue, debate, idiom_chain, roast_banter, crosstalk,
//! skit_chain

use crate::coordination::error::CoordinationError;
use crate::coordination::state::{TopicState, TurnState};

use super::{Decision, Probe};

fn current(state: &TopicState) -> Result<&TurnState, CoordinationError> {
    match state {
        TopicState::Turn(turn) => Ok(turn),
        TopicState::NotStarted => Err(CoordinationError::NotStarted),
        other => Err(CoordinationError::InvalidState(format!("expected turn state, got {:?}", other))),
    }
}

/// Only the speaker, once per turn
pub async fn message(probe: &Probe<'_>, state: &TopicState) -> Decision {
    let turn = current(state)?;
    if turn.speaker_agent_id != probe.agent_id {
        return Err(CoordinationError::NotYourTurn);
    }
    probe.fresh_message(&format!("{}_0001", turn.turn_id)).await
}

pub async fn queue_join(probe: &Probe<'_>, state: &TopicState) -> Decision {
    let turn = current(state)?;
    if turn.speaker_agent_id == probe.agent_id {
        return Err(CoordinationError::SpeakerCannotQueue);
    }
    if turn.queue.iter().any(|a| a == probe.agent_id) {
        return Err(CoordinationError::AlreadyQueued);
    }
    probe.fresh_request("queue_join", &turn.turn_id).await
}

pub async fn turn_done(probe: &Probe<'_>, state: &TopicState) -> Decision {
    let turn = current(state)?;
    if turn.speaker_agent_id != probe.agent_id {
        return Err(CoordinationError::NotYourTurn);
    }
    probe.fresh_request("turn_done", &turn.turn_id).await
}
