//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. A tool
//! declares a name, a description for the model, and a parameter schema;
//! the registry validates those at startup and wraps the tool in an
//! immutable [`ToolDescriptor`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;
use crate::schema::ParameterSchema;
use crate::trace::TraceContext;

/// Per-invocation context handed to a tool's executor.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Trace of the run that requested this call
    pub trace: TraceContext,

    /// Correlation id of the call being served
    pub call_id: String,

    /// Cancelled when the run is cancelled; long-running tools should watch it
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(trace: TraceContext, call_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            trace,
            call_id: call_id.into(),
            cancel,
        }
    }
}

/// What a tool hands back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text shown to the model
    pub text: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }
}

/// The core Tool trait.
///
/// Each capability implements this trait and is offered to the registry
/// through a [`ToolSource`](crate::registry::ToolSource).
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_current_time").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with arguments that already passed schema validation.
    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError>;
}

type ToolFn = Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync>;

/// A tool declared as a value: name, description, schema and a closure.
///
/// ```ignore
/// let tool = FnTool::new(
///     "add",
///     "Add two integers",
///     json!({"type": "object", "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}}),
///     |args, _ctx| async move {
///         let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
///         Ok(ToolOutput::text(sum.to_string()))
///     },
/// );
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    exec: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        exec: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            exec: Arc::new(move |args, ctx| Box::pin(exec(args, ctx))),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        (self.exec)(arguments, ctx).await
    }
}

/// A tool that passed discovery: validated name and parsed schema.
///
/// Only the registry constructs these; they never change afterwards.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    schema: ParameterSchema,
    source: String,
    tool: Arc<dyn Tool>,
}

impl ToolDescriptor {
    pub(crate) fn new(
        name: String,
        description: String,
        schema: ParameterSchema,
        source: String,
        tool: Arc<dyn Tool>,
    ) -> Self {
        Self {
            name,
            description,
            schema,
            source,
            tool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Name of the source the tool was discovered in.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The executor behind this descriptor.
    pub fn executor(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    /// Convert into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.as_json().clone(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Arguments of a tool call after parsing the model's serialized payload.
///
/// The serialized text is kept verbatim either way, so the assistant turn
/// written back to the transcript is exactly what the model produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Parsed { value: Value, raw: String },
    /// The payload was not valid JSON; the call is rejected without executing.
    Malformed { raw: String, reason: String },
}

impl ToolArguments {
    /// Parse a serialized payload. An empty payload means "no arguments".
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Parsed {
                value: Value::Object(serde_json::Map::new()),
                raw: raw.to_string(),
            };
        }
        match serde_json::from_str(raw) {
            Ok(value) => Self::Parsed {
                value,
                raw: raw.to_string(),
            },
            Err(e) => Self::Malformed {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        }
    }

    /// Wrap an already-structured value; its compact serialization becomes the raw text.
    pub fn from_value(value: Value) -> Self {
        let raw = value.to_string();
        Self::Parsed { value, raw }
    }

    /// The parsed value, if the payload was valid JSON.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Parsed { value, .. } => Some(value),
            Self::Malformed { .. } => None,
        }
    }

    /// The payload exactly as received.
    pub fn raw(&self) -> &str {
        match self {
            Self::Parsed { raw, .. } | Self::Malformed { raw, .. } => raw,
        }
    }

    /// Serialized form for the transcript.
    pub fn to_raw(&self) -> String {
        self.raw().to_string()
    }
}

/// A model-emitted request to invoke a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Correlation id, unique within a transcript
    pub id: String,

    /// Name of the requested tool
    pub name: String,

    pub arguments: ToolArguments,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: ToolArguments::from_value(arguments),
        }
    }

    /// Build a request from the model's serialized argument text.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw_arguments: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: ToolArguments::parse(raw_arguments),
        }
    }

    pub fn to_message_call(&self) -> MessageToolCall {
        MessageToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.to_raw(),
        }
    }
}

impl From<&MessageToolCall> for ToolCallRequest {
    fn from(call: &MessageToolCall) -> Self {
        Self::from_raw(call.id.clone(), call.name.clone(), &call.arguments)
    }
}

/// Why a tool call did not succeed.
///
/// The first three kinds are protocol errors (the model asked for something
/// invalid); the rest are execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    UnknownTool,
    MalformedArguments,
    InvalidArguments,
    Timeout,
    ExecutorError,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown-tool",
            Self::MalformedArguments => "malformed-arguments",
            Self::InvalidArguments => "invalid-arguments",
            Self::Timeout => "timeout",
            Self::ExecutorError => "executor-error",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_protocol_error(self) -> bool {
        matches!(
            self,
            Self::UnknownTool | Self::MalformedArguments | Self::InvalidArguments
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success { output: String, data: Option<Value> },
    Failure { kind: FailureKind, reason: String },
}

/// The result of one tool call. Always produced, whatever happened.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The tool that was requested
    pub tool_name: String,

    pub outcome: ToolOutcome,

    pub elapsed: Duration,
}

impl ToolResult {
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: ToolOutput,
        elapsed: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success {
                output: output.text,
                data: output.data,
            },
            elapsed,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Failure {
                kind,
                reason: reason.into(),
            },
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ToolOutcome::Failure { kind, .. } => Some(*kind),
            ToolOutcome::Success { .. } => None,
        }
    }

    /// Content of the tool-result turn fed back to the model.
    pub fn to_transcript_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { output, .. } => output.clone(),
            ToolOutcome::Failure { kind, reason } => serde_json::json!({
                "error": { "kind": kind, "message": reason }
            })
            .to_string(),
        }
    }
}
