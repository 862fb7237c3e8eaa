//! Data model for run traces, spans and usage snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// The whole run, from first model call to terminal outcome.
    Run,
    /// One model call attempt.
    ModelCall,
    /// One tool call through the gateway.
    ToolCall,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::ModelCall => write!(f, "model_call"),
            Self::ToolCall => write!(f, "tool_call"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier.
    pub id: String,
    /// Parent span id (None for root spans).
    pub parent_id: Option<String>,
    /// What kind of work this represents.
    pub kind: SpanKind,
    /// Model name, tool name, or "run".
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds (computed on end).
    pub duration_ms: Option<u64>,
    /// Prompt tokens (model calls).
    pub input_tokens: Option<u32>,
    /// Completion tokens (model calls).
    pub output_tokens: Option<u32>,
    /// Whether the operation succeeded.
    pub success: Option<bool>,
    /// Arbitrary metadata (call id, failure kind, abort reason, ...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    /// Create a new span starting now.
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self::starting_at(kind, label, Utc::now())
    }

    /// Create a span that started at a recorded instant.
    pub fn starting_at(kind: SpanKind, label: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: at,
            ended_at: None,
            duration_ms: None,
            input_tokens: None,
            output_tokens: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the parent span.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Mark the span as ended now.
    pub fn end(&mut self, success: bool) {
        self.end_at(success, Utc::now());
    }

    /// Mark the span as ended at a recorded instant.
    pub fn end_at(&mut self, success: bool, at: DateTime<Utc>) {
        self.ended_at = Some(at);
        self.duration_ms = Some(
            at.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Record token usage.
    pub fn record_tokens(&mut self, input: u32, output: u32) {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
    }

    /// Total tokens (input + output), or 0 if not recorded.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// Every span recorded under one trace id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// The run's trace id.
    pub id: String,
    /// Trace id of the enclosing session, when the run was a child.
    pub parent_id: Option<String>,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// "completed" or the abort reason label, once the run ended.
    pub outcome: Option<String>,
    /// Tool rounds the run executed.
    pub rounds: u32,
}

impl Trace {
    pub fn new(id: impl Into<String>, parent_id: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            parent_id,
            spans: Vec::new(),
            started_at: at,
            ended_at: None,
            outcome: None,
            rounds: 0,
        }
    }

    /// Add a span to this trace.
    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Mark the trace as complete.
    pub fn end(&mut self, outcome: impl Into<String>, at: DateTime<Utc>) {
        self.ended_at = Some(at);
        self.outcome = Some(outcome.into());
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.as_deref() == Some("completed")
    }

    /// Total tokens across all spans.
    pub fn total_tokens(&self) -> u32 {
        self.spans.iter().map(|s| s.total_tokens()).sum()
    }

    /// Wall-clock duration in milliseconds, once ended.
    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| {
            end.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64
        })
    }

    /// Number of model call attempts in this trace.
    pub fn model_call_count(&self) -> usize {
        self.count(SpanKind::ModelCall)
    }

    /// Number of tool calls in this trace.
    pub fn tool_call_count(&self) -> usize {
        self.count(SpanKind::ToolCall)
    }

    pub fn failed_tool_calls(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::ToolCall && s.success == Some(false))
            .count()
    }

    fn count(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// A point-in-time usage snapshot across every recorded trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub trace_count: u64,
    pub completed_runs: u64,
    pub aborted_runs: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
