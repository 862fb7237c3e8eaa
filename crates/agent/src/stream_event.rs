//! Agent-level progress events.
//!
//! `AgentStreamEvent` lets a caller watch a run as it happens (for example
//! the CLI printing text as the model streams it). Events are advisory; the
//! run's result is always the returned [`AgentRun`](crate::AgentRun).

use serde::{Deserialize, Serialize};
use workagent_core::tool::{FailureKind, ToolResult};

/// Events emitted by the agent while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// A model call failed and is being retried.
    Retry { attempt: u32, reason: String },

    /// The agent is calling a tool.
    ToolCall { id: String, name: String },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
    },
}

impl AgentStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Retry { .. } => "retry",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
        }
    }

    pub(crate) fn from_result(result: &ToolResult) -> Self {
        Self::ToolResult {
            id: result.call_id.clone(),
            name: result.tool_name.clone(),
            success: result.is_success(),
            failure: result.failure_kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn chunk_serializes_with_tag() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
        assert_eq!(event.event_type(), "chunk");
    }

    #[test]
    fn failed_result_carries_kind() {
        let result = ToolResult::failure(
            "c1",
            "slow",
            FailureKind::Timeout,
            "too slow",
            Duration::from_secs(1),
        );
        let event = AgentStreamEvent::from_result(&result);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""failure":"timeout""#));
        assert_eq!(event.event_type(), "tool_result");
    }
}
