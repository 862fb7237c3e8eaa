//! Observability events: what happened during a run, keyed by trace id.
//!
//! The orchestration loop and the tool gateway emit [`ObservabilityEvent`]s
//! into an [`EventSink`]. Sinks may fail; callers log the failure and keep
//! going, so observability never changes a run's outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::trace::TraceContext;

/// The points in a run that produce an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    ModelCall,
    ModelResponse,
    ToolDispatch,
    ToolCompleted,
    RunCompleted,
    RunAborted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::ModelCall => "model_call",
            Self::ModelResponse => "model_response",
            Self::ToolDispatch => "tool_dispatch",
            Self::ToolCompleted => "tool_completed",
            Self::RunCompleted => "run_completed",
            Self::RunAborted => "run_aborted",
        }
    }
}

/// One structured event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityEvent {
    pub trace_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_trace_id: Option<String>,

    pub kind: EventKind,

    /// Kind-specific fields (tool name, call id, elapsed ms, ...)
    #[serde(default)]
    pub payload: Value,

    pub timestamp: DateTime<Utc>,
}

impl ObservabilityEvent {
    pub fn new(trace: &TraceContext, kind: EventKind, payload: Value) -> Self {
        Self {
            trace_id: trace.id().to_string(),
            parent_trace_id: trace.parent().map(ToString::to_string),
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// A sink refused or failed to record an event.
#[derive(Debug, Clone, thiserror::Error)]
#[error("event sink '{sink}' failed: {reason}")]
pub struct SinkError {
    pub sink: String,
    pub reason: String,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

/// Destination for observability events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError>;
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        (**self).record(event)
    }
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &ObservabilityEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ObservabilityEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ObservabilityEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ObservabilityEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for EventBus {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        self.publish(event.clone());
        Ok(())
    }
}
