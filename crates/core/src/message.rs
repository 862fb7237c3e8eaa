//! Message and Transcript domain types.
//!
//! A `Transcript` is the ordered conversation state driving one orchestration
//! run: user turns, assistant turns (optionally carrying tool-call requests),
//! and tool-result turns. It enforces the correlation protocol: every tool
//! result answers exactly one earlier, still-pending tool call.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscriptError;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tools(
        content: impl Into<String>,
        tool_calls: Vec<MessageToolCall>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.into());
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }
}

/// A tool call embedded in an assistant message, in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Correlation ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string (exactly as the model produced them)
    pub arguments: String,
}

/// The ordered turns of one orchestration run.
///
/// Mutation goes through the `push_*` methods, which reject orphaned or
/// duplicate tool results and reuse of a call id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
    /// Call ids awaiting a result, in request order.
    #[serde(skip)]
    pending: Vec<String>,
    /// Every call id ever requested in this transcript.
    #[serde(skip)]
    call_ids: HashSet<String>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from stored messages, re-checking the protocol.
    pub fn from_messages(
        messages: impl IntoIterator<Item = Message>,
    ) -> Result<Self, TranscriptError> {
        let mut transcript = Self::new();
        for message in messages {
            transcript.push(message)?;
        }
        Ok(transcript)
    }

    /// Append any message, dispatching on its role.
    pub fn push(&mut self, message: Message) -> Result<(), TranscriptError> {
        match message.role {
            Role::Tool => {
                let call_id = message.tool_call_id.clone().unwrap_or_default();
                self.accept_tool_result(&call_id)?;
                self.messages.push(message);
                Ok(())
            }
            Role::Assistant => {
                self.ensure_no_pending()?;
                self.register_calls(&message.tool_calls)?;
                self.messages.push(message);
                Ok(())
            }
            Role::User | Role::System => {
                self.ensure_no_pending()?;
                self.messages.push(message);
                Ok(())
            }
        }
    }

    /// Set (or replace) the leading system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let system = Message::system(prompt);
        if self.messages.first().is_some_and(|m| m.role == Role::System) {
            self.messages[0] = system;
        } else {
            self.messages.insert(0, system);
        }
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        self.push(Message::user(content))
    }

    /// Append a tool-result turn answering `call_id`.
    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        self.push(Message::tool_result(call_id, content))
    }

    fn ensure_no_pending(&self) -> Result<(), TranscriptError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(TranscriptError::UnansweredToolCalls {
                pending: self.pending.len(),
            })
        }
    }

    fn register_calls(&mut self, calls: &[MessageToolCall]) -> Result<(), TranscriptError> {
        let mut in_turn = HashSet::new();
        for call in calls {
            if self.call_ids.contains(&call.id) || !in_turn.insert(call.id.as_str()) {
                return Err(TranscriptError::DuplicateCallId {
                    call_id: call.id.clone(),
                });
            }
        }
        for call in calls {
            self.call_ids.insert(call.id.clone());
            self.pending.push(call.id.clone());
        }
        Ok(())
    }

    fn accept_tool_result(&mut self, call_id: &str) -> Result<(), TranscriptError> {
        match self.pending.iter().position(|id| id == call_id) {
            Some(pos) => {
                self.pending.remove(pos);
                Ok(())
            }
            None if self.call_ids.contains(call_id) => Err(TranscriptError::DuplicateToolResult {
                call_id: call_id.to_string(),
            }),
            None => Err(TranscriptError::OrphanToolResult {
                call_id: call_id.to_string(),
            }),
        }
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Call ids still waiting for a result, in request order.
    pub fn pending_calls(&self) -> &[String] {
        &self.pending
    }

    /// Content of the most recent assistant turn with non-empty text.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: "echo".into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_results_must_answer_pending_calls() {
        let mut t = Transcript::new();
        t.push_user("hi").unwrap();
        t.push(Message::assistant_with_tools("", vec![call("a"), call("b")]))
            .unwrap();
        assert_eq!(t.pending_calls(), &["a".to_string(), "b".to_string()]);

        t.push_tool_result("b", "B").unwrap();
        t.push_tool_result("a", "A").unwrap();
        assert!(t.pending_calls().is_empty());
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn orphan_tool_result_rejected() {
        let mut t = Transcript::new();
        t.push_user("hi").unwrap();
        let err = t.push_tool_result("ghost", "boo").unwrap_err();
        assert_eq!(
            err,
            TranscriptError::OrphanToolResult {
                call_id: "ghost".into()
            }
        );
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn duplicate_tool_result_rejected() {
        let mut t = Transcript::new();
        t.push(Message::assistant_with_tools("", vec![call("a")]))
            .unwrap();
        t.push_tool_result("a", "first").unwrap();
        let err = t.push_tool_result("a", "second").unwrap_err();
        assert!(matches!(err, TranscriptError::DuplicateToolResult { .. }));
    }

    #[test]
    fn reused_call_id_rejected() {
        let mut t = Transcript::new();
        t.push(Message::assistant_with_tools("", vec![call("a")]))
            .unwrap();
        t.push_tool_result("a", "ok").unwrap();
        let err = t
            .push(Message::assistant_with_tools("", vec![call("a")]))
            .unwrap_err();
        assert!(matches!(err, TranscriptError::DuplicateCallId { .. }));

        let err = t
            .push(Message::assistant_with_tools("", vec![call("x"), call("x")]))
            .unwrap_err();
        assert!(matches!(err, TranscriptError::DuplicateCallId { .. }));
        // Nothing from the rejected turn leaked into the pending set
        assert!(t.pending_calls().is_empty());
    }

    #[test]
    fn new_turn_blocked_while_calls_pending() {
        let mut t = Transcript::new();
        t.push(Message::assistant_with_tools("", vec![call("a")]))
            .unwrap();
        let err = t.push_user("are you done?").unwrap_err();
        assert_eq!(err, TranscriptError::UnansweredToolCalls { pending: 1 });
    }

    #[test]
    fn system_prompt_is_inserted_once() {
        let mut t = Transcript::new();
        t.push_user("hi").unwrap();
        t.set_system_prompt("v1");
        t.set_system_prompt("v2");
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages()[0].role, Role::System);
        assert_eq!(t.messages()[0].content, "v2");
    }

    #[test]
    fn from_messages_replays_protocol() {
        let msgs = vec![
            Message::user("hi"),
            Message::assistant_with_tools("", vec![call("a")]),
            Message::tool_result("a", "done"),
            Message::assistant("all done"),
        ];
        let t = Transcript::from_messages(msgs).unwrap();
        assert_eq!(t.last_assistant_content(), Some("all done"));

        let bad = vec![Message::user("hi"), Message::tool_result("a", "done")];
        assert!(Transcript::from_messages(bad).is_err());
    }
}
