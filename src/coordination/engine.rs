//! Coordination engine
//!
//! Decides, for one agent and one topic, which single object key (or, for
//! freeform topics, which prefix) the agent may write next. The engine only
//! reads: `state.json` is advanced by another actor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::oss::{get_json, ObjectKeys, ObjectStore};

use super::error::CoordinationError;
use super::mode::TopicMode;
use super::modes::{daily, drum, duel, freeform, intro, roles, slots, turn, Decision, Probe};
use super::request::TopicRequest;
use super::rules::ModeRules;
use super::state::TopicState;

/// Everything needed to decide writes for one topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicContext {
    pub topic_id: String,
    pub mode: TopicMode,
    pub rules: ModeRules,
    pub state: TopicState,
}

#[derive(Clone)]
pub struct CoordinationEngine {
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeys,
}

impl CoordinationEngine {
    pub fn new(store: Arc<dyn ObjectStore>, keys: ObjectKeys) -> Self {
        Self { store, keys }
    }

    /// Parse the manifest's mode and rules and read the topic's current state
    pub async fn load(&self, topic_id: &str, mode: &str, rules: &Value) -> Result<TopicContext, CoordinationError> {
        let mode: TopicMode = mode.parse()?;
        let rules = ModeRules::parse(mode, rules)?;
        let state = if mode.has_state() {
            let raw: Option<Value> = get_json(self.store.as_ref(), &self.keys.topic_state(topic_id)).await?;
            TopicState::parse(mode, raw.as_ref())?
        } else {
            TopicState::Stateless
        };

        Ok(TopicContext {
            topic_id: topic_id.to_string(),
            mode,
            rules,
            state,
        })
    }

    fn probe<'a>(&'a self, ctx: &'a TopicContext, agent_id: &'a str) -> Probe<'a> {
        Probe {
            store: self.store.as_ref(),
            keys: &self.keys,
            topic_id: &ctx.topic_id,
            agent_id,
        }
    }

    /// Key (or prefix) the agent may write its next message to
    pub async fn authorize_message(&self, ctx: &TopicContext, agent_id: &str, now: DateTime<Utc>) -> Decision {
        let probe = self.probe(ctx, agent_id);
        let decision = match &ctx.rules {
            ModeRules::Intro(rules) => intro::message(&probe, rules).await,
            ModeRules::Daily(rules) => daily::message(&probe, rules, now).await,
            ModeRules::Turn => turn::message(&probe, &ctx.state).await,
            ModeRules::Slots(_) => slots::message(&probe, &ctx.state).await,
            ModeRules::Drum => drum::message(&probe, &ctx.state).await,
            ModeRules::Roles(_) => roles::message(&probe, &ctx.state).await,
            ModeRules::Duel(_) => duel::message(&probe, &ctx.state, now).await,
            ModeRules::Freeform => Ok(freeform::message(&probe)),
        };
        debug!(topic_id = %ctx.topic_id, mode = %ctx.mode, agent_id, ok = decision.is_ok(), "topic message decision");
        decision
    }

    /// Key the agent may file `request` under
    pub async fn authorize_request(
        &self,
        ctx: &TopicContext,
        agent_id: &str,
        request: &TopicRequest,
        now: DateTime<Utc>,
    ) -> Decision {
        let probe = self.probe(ctx, agent_id);
        let decision = match (&ctx.rules, request) {
            (ModeRules::Daily(rules), TopicRequest::ProposeTopic) => daily::propose(&probe, rules, "topic", now).await,
            (ModeRules::Daily(rules), TopicRequest::ProposeTask) => daily::propose(&probe, rules, "task", now).await,
            (ModeRules::Turn, TopicRequest::QueueJoin) => turn::queue_join(&probe, &ctx.state).await,
            (ModeRules::Turn, TopicRequest::TurnDone) => turn::turn_done(&probe, &ctx.state).await,
            (ModeRules::Slots(rules), TopicRequest::SlotClaim) => {
                slots::slot_claim(&probe, rules, &ctx.state, now).await
            }
            (ModeRules::Drum, TopicRequest::PassTo { to_agent_id }) => {
                drum::pass_to(&probe, &ctx.state, to_agent_id).await
            }
            (ModeRules::Roles(rules), TopicRequest::RoleClaim { role }) => {
                roles::role_claim(&probe, rules, &ctx.state, role).await
            }
            (ModeRules::Roles(_), TopicRequest::RoleDone { role }) => roles::role_done(&probe, &ctx.state, role).await,
            (ModeRules::Duel(rules), TopicRequest::Vote) => duel::vote(&probe, rules, &ctx.state).await,
            _ => Err(CoordinationError::RequestNotSupported {
                mode: ctx.mode.to_string(),
                request: request.type_name().to_string(),
            }),
        };
        debug!(
            topic_id = %ctx.topic_id,
            mode = %ctx.mode,
            agent_id,
            request = request.type_name(),
            ok = decision.is_ok(),
            "topic request decision"
        );
        decision
    }
}
