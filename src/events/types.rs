//! Run event types and key-node classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a run's ordered event log.
///
/// `seq` values for a run are 1, 2, 3, ... with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub seq: u64,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub is_key_node: bool,
    pub created_at: DateTime<Utc>,
}

/// Producer input for an append
#[derive(Debug, Clone, Deserialize)]
pub struct NewRunEvent {
    pub kind: String,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Well-known event kinds.
///
/// Key nodes mark state transitions, decisions, summaries and artifact
/// versions so replay views can highlight them. Anything unrecognised is
/// stored as-is and is never a key node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStatusChanged,
    StageChanged,
    Decision,
    Summary,
    ArtifactVersion,
    Message,
    Thought,
    ToolCall,
    ToolResult,
    WorkItemClaimed,
    WorkItemCompleted,
    WorkItemsPromoted,
    Error,
}

impl EventKind {
    pub fn parse(kind: &str) -> Option<Self> {
        let kind = match kind.trim().to_ascii_lowercase().replace(['.', '-'], "_").as_str() {
            "run_status_changed" | "run_status" => Self::RunStatusChanged,
            "stage_changed" | "stage_transition" => Self::StageChanged,
            "decision" => Self::Decision,
            "summary" => Self::Summary,
            "artifact_version" | "artifact_versioned" => Self::ArtifactVersion,
            "message" => Self::Message,
            "thought" => Self::Thought,
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "work_item_claimed" => Self::WorkItemClaimed,
            "work_item_completed" => Self::WorkItemCompleted,
            "work_items_promoted" => Self::WorkItemsPromoted,
            "error" => Self::Error,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStatusChanged => "run_status_changed",
            Self::StageChanged => "stage_changed",
            Self::Decision => "decision",
            Self::Summary => "summary",
            Self::ArtifactVersion => "artifact_version",
            Self::Message => "message",
            Self::Thought => "thought",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::WorkItemClaimed => "work_item_claimed",
            Self::WorkItemCompleted => "work_item_completed",
            Self::WorkItemsPromoted => "work_items_promoted",
            Self::Error => "error",
        }
    }

    pub fn is_key_node(&self) -> bool {
        matches!(
            self,
            Self::RunStatusChanged
                | Self::StageChanged
                | Self::Decision
                | Self::Summary
                | Self::ArtifactVersion
        )
    }
}

/// Classify a raw kind string
pub fn is_key_node(kind: &str) -> bool {
    EventKind::parse(kind).map(|k| k.is_key_node()).unwrap_or(false)
}
