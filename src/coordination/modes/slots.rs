//! limited_slots: a fixed number of slots, first come first served

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::coordination::error::CoordinationError;
use crate::coordination::rules::SlotRules;
use crate::coordination::state::{SlotsState, TopicState};

use super::{Decision, Probe};

fn current(state: &TopicState) -> Result<&SlotsState, CoordinationError> {
    match state {
        TopicState::Slots(slots) => Ok(slots),
        other => Err(CoordinationError::InvalidState(format!("expected slots state, got {:?}", other))),
    }
}

/// One write per held slot
pub async fn message(probe: &Probe<'_>, state: &TopicState) -> Decision {
    let slots = current(state)?;
    let mut held = slots.held_by(probe.agent_id).peekable();
    let first = held.peek().map(|s| s.slot_id.clone()).ok_or(CoordinationError::NoSlotHeld)?;

    for slot in held {
        if !probe.message_exists(&slot.slot_id).await? {
            return Ok(crate::oss::WriteGrant::Key(probe.message_key(&slot.slot_id)));
        }
    }
    Err(CoordinationError::AlreadyWritten(probe.message_key(&first)))
}

/// Occupancy counts assigned slots plus other agents' pending claims, so
/// a burst of claims cannot overshoot `slots_max`
pub async fn slot_claim(probe: &Probe<'_>, rules: &SlotRules, state: &TopicState, now: DateTime<Utc>) -> Decision {
    let slots = current(state)?;
    if rules.deadline.is_some_and(|d| now >= d) {
        return Err(CoordinationError::DeadlinePassed);
    }
    if slots.held_by(probe.agent_id).next().is_some() {
        return Err(CoordinationError::AlreadyWritten(probe.request_key("slot_claim", "once")));
    }

    let holders: BTreeSet<&str> = slots.slots.iter().map(|s| s.agent_id.as_str()).collect();
    let pending = probe
        .pending_requesters("slot_claim", "once")
        .await?
        .into_iter()
        .filter(|a| !holders.contains(a.as_str()))
        .count();
    if slots.slots.len() + pending >= rules.slots_max as usize {
        return Err(CoordinationError::SlotsFull);
    }
    probe.fresh_request("slot_claim", "once").await
}
