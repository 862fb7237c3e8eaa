//! Ready-made event sinks.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};
use workagent_core::event::{EventKind, EventSink, ObservabilityEvent, SinkError};

/// Writes every event to the `tracing` subscriber.
///
/// Run boundaries log at `info`, everything else at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        let parent = event.parent_trace_id.as_deref().unwrap_or("");
        match event.kind {
            EventKind::RunStarted | EventKind::RunCompleted | EventKind::RunAborted => info!(
                target: "workagent::events",
                trace_id = %event.trace_id,
                parent_trace_id = parent,
                kind = event.kind.as_str(),
                payload = %event.payload,
                "event"
            ),
            _ => debug!(
                target: "workagent::events",
                trace_id = %event.trace_id,
                parent_trace_id = parent,
                kind = event.kind.as_str(),
                payload = %event.payload,
                "event"
            ),
        }
        Ok(())
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ObservabilityEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservabilityEvent> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.lock().iter().map(|e| e.kind).collect()
    }

    /// Events belonging to one trace.
    pub fn for_trace(&self, trace_id: &str) -> Vec<ObservabilityEvent> {
        self.lock()
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ObservabilityEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        self.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards each event to several sinks.
///
/// Every sink sees every event even when an earlier one fails; the first
/// failure is reported.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &ObservabilityEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workagent_core::trace::TraceContext;

    struct Broken;

    impl EventSink for Broken {
        fn record(&self, _event: &ObservabilityEvent) -> Result<(), SinkError> {
            Err(SinkError::new("broken", "unavailable"))
        }
    }

    #[test]
    fn recording_sink_filters_by_trace() {
        let sink = RecordingSink::new();
        let a = TraceContext::new();
        let b = TraceContext::new();
        sink.record(&ObservabilityEvent::new(&a, EventKind::RunStarted, json!({}))).unwrap();
        sink.record(&ObservabilityEvent::new(&b, EventKind::RunStarted, json!({}))).unwrap();
        sink.record(&ObservabilityEvent::new(&a, EventKind::RunCompleted, json!({}))).unwrap();

        assert_eq!(sink.len(), 3);
        let kinds: Vec<_> = sink.for_trace(a.id().as_str()).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::RunStarted, EventKind::RunCompleted]);
    }

    #[test]
    fn fanout_reaches_every_sink_despite_failure() {
        let recorder = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new()
            .with(Arc::new(Broken))
            .with(recorder.clone())
            .with(Arc::new(TracingSink));
        assert_eq!(fanout.len(), 3);

        let trace = TraceContext::new();
        let result = fanout.record(&ObservabilityEvent::new(&trace, EventKind::ModelCall, json!({})));
        assert_eq!(result.unwrap_err().sink, "broken");
        assert_eq!(recorder.kinds(), vec![EventKind::ModelCall]);
    }

    #[test]
    fn empty_fanout_is_ok() {
        let fanout = FanoutSink::new();
        assert!(fanout.is_empty());
        let trace = TraceContext::new();
        assert!(fanout.record(&ObservabilityEvent::new(&trace, EventKind::RunStarted, json!({}))).is_ok());
    }
}
