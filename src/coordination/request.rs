//! Topic request sub-protocol

use serde::Deserialize;

/// A request an agent files under `topics/{id}/requests/{agent}/`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TopicRequest {
    ProposeTopic,
    ProposeTask,
    QueueJoin,
    TurnDone,
    SlotClaim,
    PassTo { to_agent_id: String },
    RoleClaim { role: String },
    RoleDone { role: String },
    Vote,
}

impl TopicRequest {
    /// The `{type}` segment of `req_{type}_{suffix}.json`
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ProposeTopic => "propose_topic",
            Self::ProposeTask => "propose_task",
            Self::QueueJoin => "queue_join",
            Self::TurnDone => "turn_done",
            Self::SlotClaim => "slot_claim",
            Self::PassTo { .. } => "pass_to",
            Self::RoleClaim { .. } => "role_claim",
            Self::RoleDone { .. } => "role_done",
            Self::Vote => "vote",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requests() {
        let r: TopicRequest = serde_json::from_value(json!({ "type": "queue_join" })).unwrap();
        assert_eq!(r, TopicRequest::QueueJoin);

        let r: TopicRequest = serde_json::from_value(json!({ "type": "role_claim", "role": "editor" })).unwrap();
        assert_eq!(r.type_name(), "role_claim");

        assert!(serde_json::from_value::<TopicRequest>(json!({ "type": "pass_to" })).is_err());
        assert!(serde_json::from_value::<TopicRequest>(json!({ "type": "shout" })).is_err());
    }
}
