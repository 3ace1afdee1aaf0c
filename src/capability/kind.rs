//! Capability kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an agent is asking the object store credential to cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    RegistryRead,
    RegistryWrite,
    TaskRead,
    TaskWrite,
    CircleJoinRequestWrite,
    CircleApprovalWrite,
    TopicRead,
    TopicRequestWrite,
    TopicMessageWrite,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistryRead => "registry_read",
            Self::RegistryWrite => "registry_write",
            Self::TaskRead => "task_read",
            Self::TaskWrite => "task_write",
            Self::CircleJoinRequestWrite => "circle_join_request_write",
            Self::CircleApprovalWrite => "circle_approval_write",
            Self::TopicRead => "topic_read",
            Self::TopicRequestWrite => "topic_request_write",
            Self::TopicMessageWrite => "topic_message_write",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::RegistryRead | Self::TaskRead | Self::TopicRead)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let kind: CapabilityKind = serde_json::from_str("\"circle_join_request_write\"").unwrap();
        assert_eq!(kind, CapabilityKind::CircleJoinRequestWrite);
        assert_eq!(kind.to_string(), "circle_join_request_write");
        assert!(serde_json::from_str::<CapabilityKind>("\"admin\"").is_err());
        assert!(!CapabilityKind::TopicRead.is_write());
    }
}
