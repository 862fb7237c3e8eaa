//! Tool execution gateway: the one path every tool call goes through.
//!
//! `execute` never fails: lookup misses, unparseable or schema-violating
//! arguments, executor errors, panics, timeouts and cancellation all come
//! back as a [`ToolResult`] with a [`FailureKind`]. Every outcome is logged
//! with the trace id and elapsed time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workagent_config::ToolConcurrency;
use workagent_core::error::ToolError;
use workagent_core::event::{EventKind, EventSink, NullSink};
use workagent_core::registry::ToolRegistry;
use workagent_core::tool::{
    FailureKind, ToolArguments, ToolCallRequest, ToolContext, ToolOutcome, ToolResult,
};
use workagent_core::trace::TraceContext;

use crate::observe::emit;

/// Executes tool calls against a registry with uniform timeout and error shape.
pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    max_concurrent: usize,
    sink: Arc<dyn EventSink>,
}

impl ToolGateway {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(30),
            max_concurrent: 4,
            sink: Arc::new(NullSink),
        }
    }

    /// Deadline for a single tool call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upper bound on in-flight calls in a parallel batch.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one tool call. Always returns a result.
    pub async fn execute(
        &self,
        request: &ToolCallRequest,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> ToolResult {
        emit(
            self.sink.as_ref(),
            trace,
            EventKind::ToolDispatch,
            json!({ "call_id": request.id, "tool": request.name }),
        );

        let start = Instant::now();
        let (outcome, detail) = self.run(request, trace, cancel).await;
        let result = ToolResult {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            outcome,
            elapsed: start.elapsed(),
        };

        log_result(&result, trace, detail.as_deref());
        emit(
            self.sink.as_ref(),
            trace,
            EventKind::ToolCompleted,
            json!({
                "call_id": result.call_id,
                "tool": result.tool_name,
                "success": result.is_success(),
                "failure_kind": result.failure_kind(),
                "elapsed_ms": result.elapsed.as_millis() as u64,
            }),
        );
        result
    }

    /// Execute every call of one model turn; results come back in request order.
    pub async fn execute_batch(
        &self,
        requests: &[ToolCallRequest],
        trace: &TraceContext,
        cancel: &CancellationToken,
        mode: ToolConcurrency,
    ) -> Vec<ToolResult> {
        match mode {
            ToolConcurrency::Serial => {
                let mut results = Vec::with_capacity(requests.len());
                for request in requests {
                    results.push(self.execute(request, trace, cancel).await);
                }
                results
            }
            ToolConcurrency::Parallel => {
                let permits = Semaphore::new(self.max_concurrent);
                let futures = requests.iter().map(|request| {
                    let permits = &permits;
                    async move {
                        // The semaphore is never closed, so acquire only fails in theory
                        let _permit = permits.acquire().await.ok();
                        self.execute(request, trace, cancel).await
                    }
                });
                join_all(futures).await
            }
        }
    }

    /// The outcome plus internal detail that is logged but never returned.
    async fn run(
        &self,
        request: &ToolCallRequest,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> (ToolOutcome, Option<String>) {
        let failure = |kind: FailureKind, reason: String| ToolOutcome::Failure { kind, reason };

        let Ok(descriptor) = self.registry.lookup(&request.name) else {
            return (
                failure(
                    FailureKind::UnknownTool,
                    format!("unknown tool '{}'", request.name),
                ),
                None,
            );
        };

        let args = match &request.arguments {
            ToolArguments::Parsed { value, .. } => value.clone(),
            ToolArguments::Malformed { reason, .. } => {
                return (
                    failure(
                        FailureKind::MalformedArguments,
                        format!("arguments are not valid JSON: {reason}"),
                    ),
                    None,
                );
            }
        };

        if let Err(violations) = descriptor.schema().validate(&args) {
            let reason = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return (failure(FailureKind::InvalidArguments, reason), None);
        }

        if cancel.is_cancelled() {
            return (
                failure(FailureKind::Cancelled, "run was cancelled".into()),
                None,
            );
        }

        let ctx = ToolContext::new(trace.clone(), request.id.clone(), cancel.child_token());
        let invocation = AssertUnwindSafe(descriptor.executor().execute(args, ctx)).catch_unwind();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => (
                failure(FailureKind::Cancelled, "run was cancelled".into()),
                None,
            ),
            finished = tokio::time::timeout(self.timeout, invocation) => match finished {
                Err(_) => (
                    failure(
                        FailureKind::Timeout,
                        format!("tool did not finish within {}s", self.timeout.as_secs_f64()),
                    ),
                    None,
                ),
                Ok(Err(panic)) => (
                    failure(FailureKind::ExecutorError, "the tool crashed".into()),
                    Some(format!("panic: {}", panic_message(panic.as_ref()))),
                ),
                Ok(Ok(Err(ToolError::Cancelled))) => (
                    failure(FailureKind::Cancelled, "tool stopped on cancellation".into()),
                    None,
                ),
                Ok(Ok(Err(e))) => (
                    failure(FailureKind::ExecutorError, e.public_message()),
                    Some(e.to_string()),
                ),
                Ok(Ok(Ok(output))) => (
                    ToolOutcome::Success {
                        output: output.text,
                        data: output.data,
                    },
                    None,
                ),
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

fn log_result(result: &ToolResult, trace: &TraceContext, detail: Option<&str>) {
    let elapsed_ms = result.elapsed.as_millis() as u64;
    match &result.outcome {
        ToolOutcome::Success { .. } => info!(
            trace_id = %trace.id(),
            call_id = %result.call_id,
            tool = %result.tool_name,
            elapsed_ms,
            "Tool call succeeded"
        ),
        ToolOutcome::Failure { kind, reason } => {
            warn!(
                trace_id = %trace.id(),
                call_id = %result.call_id,
                tool = %result.tool_name,
                kind = kind.as_str(),
                protocol_error = kind.is_protocol_error(),
                %reason,
                elapsed_ms,
                "Tool call failed"
            );
            if let Some(detail) = detail {
                debug!(trace_id = %trace.id(), call_id = %result.call_id, %detail, "Tool failure detail");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use serde_json::{Value, json};
    use workagent_core::event::{ObservabilityEvent, SinkError};
    use workagent_core::registry::StaticSource;
    use workagent_core::tool::{FnTool, ToolOutput};

    fn object_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        })
    }

    fn gateway_with(tools: Vec<FnTool>) -> ToolGateway {
        let mut source = StaticSource::new("test");
        for tool in tools {
            source.register(Arc::new(tool));
        }
        let registry = ToolRegistry::discover(&[&source]).unwrap();
        ToolGateway::new(Arc::new(registry))
    }

    fn counting_tool(name: &str, calls: Arc<AtomicUsize>) -> FnTool {
        FnTool::new(name, "Counts invocations", object_schema(), move |args, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ToolOutput::text(format!("weather in {}", args["city"].as_str().unwrap_or("?"))))
            }
        })
    }

    fn sleepy_tool(name: &str, delay_ms: u64) -> FnTool {
        FnTool::new(
            name,
            "Sleeps, then answers",
            json!({"type": "object"}),
            move |_args, _ctx| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(ToolOutput::text(format!("slept {delay_ms}ms")))
            },
        )
    }

    #[tokio::test]
    async fn success_carries_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gw = gateway_with(vec![counting_tool("get_city_weather", calls.clone())]);
        let req = ToolCallRequest::new("c1", "get_city_weather", json!({"city": "Paris"}));

        let result = gw.execute(&req, &TraceContext::new(), &CancellationToken::new()).await;
        assert!(result.is_success());
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.to_transcript_content(), "weather in Paris");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_never_invokes_anything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gw = gateway_with(vec![counting_tool("get_city_weather", calls.clone())]);
        let req = ToolCallRequest::new("c1", "launch_rockets", json!({}));

        let result = gw.execute(&req, &TraceContext::new(), &CancellationToken::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::UnknownTool));
        assert!(result.to_transcript_content().contains("launch_rockets"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_and_invalid_arguments_rejected_before_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gw = gateway_with(vec![counting_tool("get_city_weather", calls.clone())]);
        let trace = TraceContext::new();
        let cancel = CancellationToken::new();

        let malformed = ToolCallRequest::from_raw("c1", "get_city_weather", "{\"city\": ");
        let result = gw.execute(&malformed, &trace, &cancel).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::MalformedArguments));

        let invalid = ToolCallRequest::new("c2", "get_city_weather", json!({"city": 42}));
        let result = gw.execute(&invalid, &trace, &cancel).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidArguments));
        assert!(result.to_transcript_content().contains("city"));

        let missing = ToolCallRequest::new("c3", "get_city_weather", json!({}));
        let result = gw.execute(&missing, &trace, &cancel).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidArguments));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let gw = gateway_with(vec![sleepy_tool("slow", 60_000)]).with_timeout(Duration::from_secs(1));
        let req = ToolCallRequest::new("c1", "slow", json!({}));

        let result = gw.execute(&req, &TraceContext::new(), &CancellationToken::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn panic_becomes_executor_error() {
        let boom = FnTool::new("boom", "Always panics", json!({"type": "object"}), |_args, _ctx| async {
            if true {
                panic!("secret=hunter2");
            }
            Ok(ToolOutput::text("unreachable"))
        });
        let gw = gateway_with(vec![boom]);
        let req = ToolCallRequest::new("c1", "boom", json!({}));

        let result = gw.execute(&req, &TraceContext::new(), &CancellationToken::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ExecutorError));
        assert!(!result.to_transcript_content().contains("hunter2"));
    }

    #[tokio::test]
    async fn internal_error_text_is_not_echoed() {
        let leaky = FnTool::new("leaky", "Fails internally", json!({"type": "object"}), |_args, _ctx| async {
            Err(ToolError::Internal("postgres://admin:hunter2@db refused".into()))
        });
        let gw = gateway_with(vec![leaky]);
        let req = ToolCallRequest::new("c1", "leaky", json!({}));

        let result = gw.execute(&req, &TraceContext::new(), &CancellationToken::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ExecutorError));
        assert!(!result.to_transcript_content().contains("hunter2"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_in_flight_call() {
        let gw = gateway_with(vec![sleepy_tool("slow", 60_000)]);
        let req = ToolCallRequest::new("c1", "slow", json!({}));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = gw.execute(&req, &TraceContext::new(), &cancel).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_batch_keeps_request_order() {
        let gw = gateway_with(vec![
            sleepy_tool("a", 30),
            sleepy_tool("b", 50),
            sleepy_tool("c", 10),
        ]);
        let requests = vec![
            ToolCallRequest::new("call_a", "a", json!({})),
            ToolCallRequest::new("call_b", "b", json!({})),
            ToolCallRequest::new("call_c", "c", json!({})),
        ];

        let started = tokio::time::Instant::now();
        let results = gw
            .execute_batch(&requests, &TraceContext::new(), &CancellationToken::new(), ToolConcurrency::Parallel)
            .await;
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["call_a", "call_b", "call_c"]);
        // Ran together: total time is the slowest call, not the sum
        assert!(started.elapsed() < Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_batch_respects_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tool = {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            FnTool::new("work", "Tracks concurrency", json!({"type": "object"}), move |_args, _ctx| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(ToolOutput::text("done"))
                }
            })
        };
        let gw = gateway_with(vec![tool]).with_max_concurrent(2);
        let requests: Vec<_> = (0..6)
            .map(|i| ToolCallRequest::new(format!("call_{i}"), "work", json!({})))
            .collect();

        let results = gw
            .execute_batch(&requests, &TraceContext::new(), &CancellationToken::new(), ToolConcurrency::Parallel)
            .await;
        assert!(results.iter().all(ToolResult::is_success));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn serial_batch_runs_one_at_a_time() {
        let gw = gateway_with(vec![sleepy_tool("a", 20), sleepy_tool("b", 20)]);
        let requests = vec![
            ToolCallRequest::new("call_a", "a", json!({})),
            ToolCallRequest::new("call_b", "b", json!({})),
        ];
        let started = tokio::time::Instant::now();
        let results = gw
            .execute_batch(&requests, &TraceContext::new(), &CancellationToken::new(), ToolConcurrency::Serial)
            .await;
        assert_eq!(results.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    struct FailingSink {
        attempts: Mutex<usize>,
    }

    impl EventSink for FailingSink {
        fn record(&self, _event: &ObservabilityEvent) -> Result<(), SinkError> {
            *self.attempts.lock().unwrap() += 1;
            Err(SinkError::new("failing", "disk full"))
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_change_outcome() {
        let sink = Arc::new(FailingSink {
            attempts: Mutex::new(0),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let gw = gateway_with(vec![counting_tool("get_city_weather", calls)]).with_sink(sink.clone());
        let req = ToolCallRequest::new("c1", "get_city_weather", json!({"city": "Oslo"}));

        let result = gw.execute(&req, &TraceContext::new(), &CancellationToken::new()).await;
        assert!(result.is_success());
        // dispatch + completed
        assert_eq!(*sink.attempts.lock().unwrap(), 2);
    }
}
