//! Thread-safe telemetry engine: folds observability events into
//! per-trace span records and serves usage reports.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use workagent_core::event::{EventKind, EventSink, ObservabilityEvent, SinkError};

use crate::model::*;

/// Traces kept before the oldest finished ones are dropped.
const MAX_TRACES: usize = 5_000;

/// The core telemetry engine.
///
/// Thread-safe via `RwLock`. Each trace id gets one [`Trace`]; model calls
/// and tool calls become child spans of the run span.
pub struct TelemetryEngine {
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    max_traces: usize,
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRACES)
    }

    /// Engine that keeps at most `max_traces` traces.
    pub fn with_capacity(max_traces: usize) -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            max_traces: max_traces.max(1),
        }
    }

    /// Fold one event into its trace.
    pub fn ingest(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        let mut traces = self
            .traces
            .write()
            .map_err(|_| SinkError::new("telemetry", "trace store lock poisoned"))?;

        let index = match traces.iter().position(|t| t.id == event.trace_id) {
            Some(i) => i,
            None => {
                prune_finished(&mut traces, self.max_traces);
                traces.push(Trace::new(
                    event.trace_id.clone(),
                    event.parent_trace_id.clone(),
                    event.timestamp,
                ));
                traces.len() - 1
            }
        };
        apply(&mut traces[index], event);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        self.read().iter().find(|t| t.id == trace_id).cloned()
    }

    /// Most recent traces first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    /// Runs started as children of `parent_id` (e.g. the turns of a REPL session).
    pub fn traces_with_parent(&self, parent_id: &str) -> Vec<Trace> {
        self.read()
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    pub fn trace_count(&self) -> usize {
        self.read().len()
    }

    /// Aggregate counts over every trace held.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let traces = self.read();
        let mut snapshot = UsageSnapshot {
            trace_count: traces.len() as u64,
            ..UsageSnapshot::default()
        };
        for trace in traces.iter() {
            match trace.outcome.as_deref() {
                Some("completed") => snapshot.completed_runs += 1,
                Some(_) => snapshot.aborted_runs += 1,
                None => {}
            }
            snapshot.model_calls += trace.model_call_count() as u64;
            snapshot.tool_calls += trace.tool_call_count() as u64;
            snapshot.tool_failures += trace.failed_tool_calls() as u64;
            for span in &trace.spans {
                snapshot.input_tokens += u64::from(span.input_tokens.unwrap_or(0));
                snapshot.output_tokens += u64::from(span.output_tokens.unwrap_or(0));
            }
        }
        snapshot
    }

    /// Drop traces that started before `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        let before = traces.len();
        traces.retain(|t| t.started_at >= cutoff);
        before - traces.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Trace>> {
        self.traces.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TelemetryEngine {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        self.ingest(event)
    }
}

/// Remove the oldest finished traces once the store is full.
fn prune_finished(traces: &mut Vec<Trace>, max: usize) {
    if traces.len() < max {
        return;
    }
    let drain_count = (max / 10).max(1);
    let mut removed = 0;
    traces.retain(|t| {
        if removed >= drain_count || t.ended_at.is_none() {
            return true;
        }
        removed += 1;
        false
    });
    if removed > 0 {
        tracing::debug!(removed, "Pruned finished traces");
    }
}

fn apply(trace: &mut Trace, event: &ObservabilityEvent) {
    let at = event.timestamp;
    let payload = &event.payload;
    let run_span = trace
        .spans
        .iter()
        .find(|s| s.kind == SpanKind::Run)
        .map(|s| s.id.clone());

    match event.kind {
        EventKind::RunStarted => {
            trace.started_at = at;
            let mut span = Span::starting_at(SpanKind::Run, "run", at);
            copy_field(payload, &mut span, "model");
            copy_field(payload, &mut span, "max_rounds");
            trace.add_span(span);
        }
        EventKind::ModelCall => {
            // A new attempt means the previous one failed
            close_open(trace, SpanKind::ModelCall, false, at);
            let label = payload["model"].as_str().unwrap_or("model");
            let mut span = child_of(Span::starting_at(SpanKind::ModelCall, label, at), &run_span);
            copy_field(payload, &mut span, "round");
            copy_field(payload, &mut span, "attempt");
            trace.add_span(span);
        }
        EventKind::ModelResponse => {
            if let Some(span) = open_span(trace, |s| s.kind == SpanKind::ModelCall) {
                let usage = &payload["usage"];
                if let (Some(input), Some(output)) = (
                    usage["prompt_tokens"].as_u64(),
                    usage["completion_tokens"].as_u64(),
                ) {
                    span.record_tokens(input as u32, output as u32);
                }
                copy_field(payload, span, "tool_calls");
                span.end_at(true, at);
            }
        }
        EventKind::ToolDispatch => {
            let label = payload["tool"].as_str().unwrap_or("tool");
            let mut span = child_of(Span::starting_at(SpanKind::ToolCall, label, at), &run_span);
            copy_field(payload, &mut span, "call_id");
            trace.add_span(span);
        }
        EventKind::ToolCompleted => {
            let call_id = payload["call_id"].as_str().unwrap_or_default();
            if let Some(span) = open_span(trace, |s| {
                s.kind == SpanKind::ToolCall && s.metadata.get("call_id").and_then(Value::as_str) == Some(call_id)
            }) {
                let success = payload["success"].as_bool().unwrap_or(false);
                copy_field(payload, span, "failure_kind");
                span.end_at(success, at);
                // The gateway's own measurement is more precise than event timestamps
                if let Some(elapsed) = payload["elapsed_ms"].as_u64() {
                    span.duration_ms = Some(elapsed);
                }
            }
        }
        EventKind::RunCompleted | EventKind::RunAborted => {
            let completed = event.kind == EventKind::RunCompleted;
            let outcome = if completed {
                "completed"
            } else {
                payload["reason"].as_str().unwrap_or("aborted")
            }
            .to_string();

            trace.rounds = payload["rounds"].as_u64().unwrap_or(0) as u32;
            close_open(trace, SpanKind::ModelCall, false, at);
            close_open(trace, SpanKind::ToolCall, false, at);
            if let Some(span) = open_span(trace, |s| s.kind == SpanKind::Run) {
                span.metadata.insert("outcome".into(), Value::String(outcome.clone()));
                span.end_at(completed, at);
            }
            trace.end(outcome, at);
        }
    }
}

fn child_of(span: Span, parent: &Option<String>) -> Span {
    match parent {
        Some(id) => span.with_parent(id.as_str()),
        None => span,
    }
}

fn open_span(trace: &mut Trace, matches: impl Fn(&Span) -> bool) -> Option<&mut Span> {
    trace
        .spans
        .iter_mut()
        .rev()
        .find(|s| s.is_open() && matches(s))
}

fn close_open(trace: &mut Trace, kind: SpanKind, success: bool, at: DateTime<Utc>) {
    for span in trace.spans.iter_mut().filter(|s| s.kind == kind && s.is_open()) {
        span.end_at(success, at);
    }
}

fn copy_field(payload: &Value, span: &mut Span, key: &str) {
    if let Some(value) = payload.get(key).filter(|v| !v.is_null()) {
        span.metadata.insert(key.to_string(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workagent_core::trace::TraceContext;

    fn event(trace: &TraceContext, kind: EventKind, payload: Value) -> ObservabilityEvent {
        ObservabilityEvent::new(trace, kind, payload)
    }

    fn feed_tool_run(engine: &TelemetryEngine, trace: &TraceContext) {
        let usage = json!({"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120});
        for e in [
            event(trace, EventKind::RunStarted, json!({"model": "gpt-4o", "max_rounds": 10})),
            event(trace, EventKind::ModelCall, json!({"model": "gpt-4o", "round": 1, "attempt": 1})),
            event(trace, EventKind::ModelResponse, json!({"usage": usage, "tool_calls": ["get_city_weather", "get_current_time"]})),
            event(trace, EventKind::ToolDispatch, json!({"call_id": "c1", "tool": "get_city_weather"})),
            event(trace, EventKind::ToolDispatch, json!({"call_id": "c2", "tool": "get_current_time"})),
            event(trace, EventKind::ToolCompleted, json!({"call_id": "c2", "tool": "get_current_time", "success": true, "elapsed_ms": 3})),
            event(trace, EventKind::ToolCompleted, json!({"call_id": "c1", "tool": "get_city_weather", "success": false, "failure_kind": "timeout", "elapsed_ms": 30000})),
            event(trace, EventKind::ModelCall, json!({"model": "gpt-4o", "round": 2, "attempt": 1})),
            event(trace, EventKind::ModelResponse, json!({"usage": usage, "tool_calls": []})),
            event(trace, EventKind::RunCompleted, json!({"rounds": 1, "total_tokens": 240})),
        ] {
            engine.ingest(&e).unwrap();
        }
    }

    #[test]
    fn run_events_become_spans() {
        let engine = TelemetryEngine::new();
        let trace = TraceContext::new();
        feed_tool_run(&engine, &trace);

        let t = engine.get_trace(trace.id().as_str()).unwrap();
        assert!(t.is_completed());
        assert_eq!(t.rounds, 1);
        assert_eq!(t.model_call_count(), 2);
        assert_eq!(t.tool_call_count(), 2);
        assert_eq!(t.failed_tool_calls(), 1);
        assert_eq!(t.total_tokens(), 240);
        assert!(t.spans.iter().all(|s| !s.is_open()));

        let run_id = &t.spans[0].id;
        assert!(t.spans[1..].iter().all(|s| s.parent_id.as_ref() == Some(run_id)));

        let weather = t.spans.iter().find(|s| s.label == "get_city_weather").unwrap();
        assert_eq!(weather.duration_ms, Some(30000));
        assert_eq!(weather.metadata["failure_kind"], "timeout");
    }

    #[test]
    fn retried_model_call_closes_previous_attempt() {
        let engine = TelemetryEngine::new();
        let trace = TraceContext::new();
        engine.ingest(&event(&trace, EventKind::RunStarted, json!({}))).unwrap();
        engine.ingest(&event(&trace, EventKind::ModelCall, json!({"attempt": 1}))).unwrap();
        engine.ingest(&event(&trace, EventKind::ModelCall, json!({"attempt": 2}))).unwrap();
        engine
            .ingest(&event(&trace, EventKind::RunAborted, json!({"rounds": 0, "reason": "model-unavailable"})))
            .unwrap();

        let t = engine.get_trace(trace.id().as_str()).unwrap();
        let attempts: Vec<_> = t
            .spans
            .iter()
            .filter(|s| s.kind == SpanKind::ModelCall)
            .map(|s| s.success)
            .collect();
        assert_eq!(attempts, vec![Some(false), Some(false)]);
        assert_eq!(t.outcome.as_deref(), Some("model-unavailable"));
        assert_eq!(t.spans[0].success, Some(false));
    }

    #[test]
    fn child_traces_link_to_session() {
        let engine = TelemetryEngine::new();
        let session = TraceContext::new();
        let turn1 = session.child();
        let turn2 = session.child();
        for t in [&turn1, &turn2] {
            engine.ingest(&event(t, EventKind::RunStarted, json!({}))).unwrap();
        }
        engine.ingest(&event(&TraceContext::new(), EventKind::RunStarted, json!({}))).unwrap();

        let children = engine.traces_with_parent(session.id().as_str());
        assert_eq!(children.len(), 2);
        assert_eq!(engine.trace_count(), 3);
        assert_eq!(engine.recent_traces(1)[0].parent_id, None);
    }

    #[test]
    fn events_without_run_start_still_recorded() {
        let engine = TelemetryEngine::new();
        let trace = TraceContext::new();
        engine
            .ingest(&event(&trace, EventKind::ToolDispatch, json!({"call_id": "c1", "tool": "shell_echo"})))
            .unwrap();
        let t = engine.get_trace(trace.id().as_str()).unwrap();
        assert_eq!(t.tool_call_count(), 1);
        assert!(t.spans[0].parent_id.is_none());
    }

    #[test]
    fn usage_snapshot_totals() {
        let engine = TelemetryEngine::new();
        feed_tool_run(&engine, &TraceContext::new());
        let aborted = TraceContext::new();
        engine.ingest(&event(&aborted, EventKind::RunStarted, json!({}))).unwrap();
        engine
            .ingest(&event(&aborted, EventKind::RunAborted, json!({"rounds": 0, "reason": "cancelled"})))
            .unwrap();

        let snapshot = engine.usage_snapshot();
        assert_eq!(snapshot.trace_count, 2);
        assert_eq!(snapshot.completed_runs, 1);
        assert_eq!(snapshot.aborted_runs, 1);
        assert_eq!(snapshot.model_calls, 2);
        assert_eq!(snapshot.tool_calls, 2);
        assert_eq!(snapshot.tool_failures, 1);
        assert_eq!(snapshot.input_tokens, 200);
        assert_eq!(snapshot.output_tokens, 40);
    }

    #[test]
    fn full_store_drops_oldest_finished() {
        let engine = TelemetryEngine::with_capacity(3);
        let first = TraceContext::new();
        feed_tool_run(&engine, &first);
        let open = TraceContext::new();
        engine.ingest(&event(&open, EventKind::RunStarted, json!({}))).unwrap();
        feed_tool_run(&engine, &TraceContext::new());
        feed_tool_run(&engine, &TraceContext::new());

        assert_eq!(engine.trace_count(), 3);
        assert!(engine.get_trace(first.id().as_str()).is_none());
        assert!(engine.get_trace(open.id().as_str()).is_some());
    }

    #[test]
    fn prune_old_traces() {
        let engine = TelemetryEngine::new();
        feed_tool_run(&engine, &TraceContext::new());
        let removed = engine.prune_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(removed, 1);
        assert_eq!(engine.trace_count(), 0);
    }

    #[test]
    fn engine_works_as_event_sink() {
        let engine = TelemetryEngine::default();
        let sink: &dyn EventSink = &engine;
        let trace = TraceContext::new();
        sink.record(&event(&trace, EventKind::RunStarted, json!({}))).unwrap();
        assert_eq!(engine.trace_count(), 1);
    }
}
