//! intro_once: one introduction card per agent per card version

use crate::coordination::error::CoordinationError;
use crate::coordination::rules::IntroRules;

use super::{Decision, Probe};

const CARD_PREFIX: &str = "intro_card_v";

pub async fn message(probe: &Probe<'_>, rules: &IntroRules) -> Decision {
    let suffix = format!("{}{}", CARD_PREFIX, rules.card_version);

    if !rules.allow_reintro {
        if let Some(previous) = probe
            .own_message_stems()
            .await?
            .into_iter()
            .find(|s| s.starts_with(CARD_PREFIX))
        {
            return Err(CoordinationError::AlreadyWritten(probe.message_key(&previous)));
        }
    }
    probe.fresh_message(&suffix).await
}
