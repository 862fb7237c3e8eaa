//! Event emission shared by the loop and the gateway.

use serde_json::Value;
use tracing::warn;
use workagent_core::event::{EventKind, EventSink, ObservabilityEvent};
use workagent_core::trace::TraceContext;

/// Record an event; a sink failure is logged and otherwise ignored.
pub(crate) fn emit(sink: &dyn EventSink, trace: &TraceContext, kind: EventKind, payload: Value) {
    let event = ObservabilityEvent::new(trace, kind, payload);
    if let Err(e) = sink.record(&event) {
        warn!(trace_id = %trace.id(), kind = kind.as_str(), error = %e, "Event sink rejected event");
    }
}
