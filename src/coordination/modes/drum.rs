//! drum_pass: the holder writes one beat, then hands the drum on

use crate::coordination::error::CoordinationError;
use crate::coordination::state::{DrumState, TopicState};

use super::{Decision, Probe};

fn current(state: &TopicState) -> Result<&DrumState, CoordinationError> {
    match state {
        TopicState::Drum(drum) => Ok(drum),
        TopicState::NotStarted => Err(CoordinationError::NotStarted),
        other => Err(CoordinationError::InvalidState(format!("expected drum state, got {:?}", other))),
    }
}

fn holder<'s>(probe: &Probe<'_>, state: &'s TopicState) -> Result<&'s DrumState, CoordinationError> {
    let drum = current(state)?;
    if drum.holder_agent_id != probe.agent_id {
        return Err(CoordinationError::NotHolder);
    }
    Ok(drum)
}

pub async fn message(probe: &Probe<'_>, state: &TopicState) -> Decision {
    let drum = holder(probe, state)?;
    probe.fresh_message(&format!("beat_{}", drum.beat_id)).await
}

pub async fn pass_to(probe: &Probe<'_>, state: &TopicState, to_agent_id: &str) -> Decision {
    let drum = holder(probe, state)?;
    let target = to_agent_id.trim();
    if target.is_empty() {
        return Err(CoordinationError::InvalidRequest("to_agent_id is required".into()));
    }
    if target == probe.agent_id {
        return Err(CoordinationError::InvalidRequest("cannot pass the drum to yourself".into()));
    }
    probe.fresh_request("pass_to", &drum.beat_id).await
}
