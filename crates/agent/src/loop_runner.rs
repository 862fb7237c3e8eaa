//! The orchestration loop: model call, tool round, repeat.
//!
//! A run is an explicit state machine:
//!
//! ```text
//! AwaitingModel ──(no tool calls)──────────────► Finished
//!      │  ▲
//!      │  └──────────── ExecutingTools ◄──(tool calls)
//!      │
//!      └──(limit / cancel / model down / protocol)──► Aborted
//! ```
//!
//! The model call is the only place the loop waits on external I/O; tool
//! calls go through the [`ToolGateway`], which turns every tool failure into
//! data. Only run-fatal conditions reach `Aborted`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use workagent_config::{AgentSettings, AppConfig, ToolConcurrency};
use workagent_core::error::{ProviderError, TranscriptError};
use workagent_core::event::{EventKind, EventSink, NullSink};
use workagent_core::message::{Message, Transcript};
use workagent_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use workagent_core::registry::ToolRegistry;
use workagent_core::tool::{ToolCallRequest, ToolResult};
use workagent_core::trace::TraceContext;

use crate::aggregator::{AggregatedTurn, StreamAggregator};
use crate::gateway::ToolGateway;
use crate::observe::emit;
use crate::outcome::{AbortReason, AgentRun, RunOutcome};
use crate::stream_event::AgentStreamEvent;

/// Limits and execution policy for a run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Tool rounds allowed before the run aborts
    pub max_rounds: u32,
    pub tool_timeout: Duration,
    pub model_timeout: Duration,
    pub max_concurrent_tools: usize,
    pub concurrency: ToolConcurrency,
    /// Ask the provider for a streamed response
    pub streaming: bool,
    /// Total attempts per model call
    pub model_max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl LoopConfig {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            max_rounds: settings.max_rounds,
            tool_timeout: settings.tool_timeout(),
            model_timeout: settings.model_timeout(),
            max_concurrent_tools: settings.max_concurrent_tools,
            concurrency: settings.tool_concurrency,
            streaming: settings.streaming,
            model_max_attempts: settings.model_max_attempts.max(1),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_settings(&AgentSettings::default())
    }
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCallRequest>),
    Finished(String),
    Aborted(AbortReason),
}

type EventTx = mpsc::UnboundedSender<AgentStreamEvent>;

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    gateway: ToolGateway,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    config: LoopConfig,
    sink: Arc<dyn EventSink>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        let config = LoopConfig::default();
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        Self {
            gateway: build_gateway(&registry, &config, &sink),
            provider,
            registry,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: None,
            config,
            sink,
        }
    }

    /// Build a loop with model, prompt and limits taken from the app config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, registry, &config.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_system_prompt(&config.system_prompt)
            .with_config(LoopConfig::from_settings(&config.agent))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// System instructions placed at the head of every transcript this loop runs.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.gateway = build_gateway(&self.registry, &config, &self.sink);
        self.config = config;
        self
    }

    /// Where run, model and tool events are recorded.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.gateway = build_gateway(&self.registry, &self.config, &sink);
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run a single user prompt from an empty transcript.
    pub async fn run_prompt(
        &self,
        prompt: impl Into<String>,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> AgentRun {
        let mut transcript = Transcript::new();
        if let Err(e) = transcript.push_user(prompt) {
            return self.finish(transcript, trace, 0, Usage::default(), Err(AbortReason::ProtocolViolation(e)));
        }
        self.run(transcript, trace, cancel).await
    }

    /// Drive `transcript` until the model answers or the run aborts.
    pub async fn run(
        &self,
        transcript: Transcript,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> AgentRun {
        self.run_inner(transcript, trace, cancel, None).await
    }

    /// Like [`run`](Self::run), reporting progress on `events` as it goes.
    pub async fn run_with_events(
        &self,
        transcript: Transcript,
        trace: &TraceContext,
        cancel: &CancellationToken,
        events: EventTx,
    ) -> AgentRun {
        self.run_inner(transcript, trace, cancel, Some(&events)).await
    }

    async fn run_inner(
        &self,
        transcript: Transcript,
        trace: &TraceContext,
        cancel: &CancellationToken,
        events: Option<&EventTx>,
    ) -> AgentRun {
        let span = info_span!(
            "agent_run",
            trace_id = %trace.id(),
            parent_trace_id = trace.parent().map(|p| p.as_str()).unwrap_or(""),
        );
        self.drive(transcript, trace, cancel, events)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        mut transcript: Transcript,
        trace: &TraceContext,
        cancel: &CancellationToken,
        events: Option<&EventTx>,
    ) -> AgentRun {
        if let Some(prompt) = &self.system_prompt {
            transcript.set_system_prompt(prompt.as_str());
        }

        let definitions = self.registry.definitions();
        info!(
            trace_id = %trace.id(),
            model = %self.model,
            tools = definitions.len(),
            messages = transcript.len(),
            "Run started"
        );
        emit(
            self.sink.as_ref(),
            trace,
            EventKind::RunStarted,
            json!({ "model": self.model, "tools": definitions.len(), "max_rounds": self.config.max_rounds }),
        );

        let mut rounds = 0u32;
        let mut usage = Usage::default();
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if cancel.is_cancelled() {
                        LoopState::Aborted(AbortReason::Cancelled)
                    } else {
                        match self
                            .call_model(&transcript, &definitions, trace, cancel, rounds + 1, events)
                            .await
                        {
                            Ok(turn) => {
                                if let Some(u) = &turn.usage {
                                    usage.add(u);
                                }
                                self.on_model_turn(&mut transcript, turn, rounds, trace, events)
                            }
                            Err(reason) => LoopState::Aborted(reason),
                        }
                    }
                }
                LoopState::ExecutingTools(requests) => {
                    rounds += 1;
                    debug!(trace_id = %trace.id(), round = rounds, calls = requests.len(), "Executing tool round");
                    let results = self
                        .gateway
                        .execute_batch(&requests, trace, cancel, self.config.concurrency)
                        .await;

                    if let Some(tx) = events {
                        for result in &results {
                            let _ = tx.send(AgentStreamEvent::from_result(result));
                        }
                    }

                    match append_results(&mut transcript, &results) {
                        Err(e) => LoopState::Aborted(AbortReason::ProtocolViolation(e)),
                        Ok(()) if cancel.is_cancelled() => LoopState::Aborted(AbortReason::Cancelled),
                        Ok(()) => LoopState::AwaitingModel,
                    }
                }
                LoopState::Finished(content) => {
                    return self.finish(transcript, trace, rounds, usage, Ok(content));
                }
                LoopState::Aborted(reason) => {
                    return self.finish(transcript, trace, rounds, usage, Err(reason));
                }
            };
        }
    }

    /// Decide the next state from what the model said.
    fn on_model_turn(
        &self,
        transcript: &mut Transcript,
        turn: AggregatedTurn,
        rounds: u32,
        trace: &TraceContext,
        events: Option<&EventTx>,
    ) -> LoopState {
        emit(
            self.sink.as_ref(),
            trace,
            EventKind::ModelResponse,
            json!({
                "round": rounds + 1,
                "content_len": turn.content.len(),
                "tool_calls": turn.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "usage": turn.usage,
            }),
        );

        if turn.tool_calls.is_empty() {
            return match transcript.push(Message::assistant(turn.content.as_str())) {
                Ok(()) => LoopState::Finished(turn.content),
                Err(e) => LoopState::Aborted(AbortReason::ProtocolViolation(e)),
            };
        }

        if rounds >= self.config.max_rounds {
            warn!(
                trace_id = %trace.id(),
                limit = self.config.max_rounds,
                requested = turn.tool_calls.len(),
                "Round limit reached; model still requesting tools"
            );
            return LoopState::Aborted(AbortReason::RoundLimitExceeded {
                limit: self.config.max_rounds,
            });
        }

        let calls = turn.tool_calls.iter().map(ToolCallRequest::to_message_call).collect();
        if let Err(e) = transcript.push(Message::assistant_with_tools(turn.content, calls)) {
            return LoopState::Aborted(AbortReason::ProtocolViolation(e));
        }

        if let Some(tx) = events {
            for call in &turn.tool_calls {
                let _ = tx.send(AgentStreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                });
            }
        }
        LoopState::ExecutingTools(turn.tool_calls)
    }

    /// One model call with per-attempt timeout, retries and cancellation.
    async fn call_model(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
        trace: &TraceContext,
        cancel: &CancellationToken,
        round: u32,
        events: Option<&EventTx>,
    ) -> Result<AggregatedTurn, AbortReason> {
        let max_attempts = self.config.model_max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            emit(
                self.sink.as_ref(),
                trace,
                EventKind::ModelCall,
                json!({
                    "round": round,
                    "attempt": attempt,
                    "model": self.model,
                    "messages": transcript.len(),
                    "stream": self.config.streaming,
                }),
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: transcript.messages().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tools.to_vec(),
                stream: self.config.streaming,
                trace_id: Some(trace.id().to_string()),
            };

            let timeout = self.config.model_timeout;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AbortReason::Cancelled),
                r = tokio::time::timeout(timeout, self.request_turn(request, round, events)) => {
                    r.unwrap_or_else(|_| {
                        Err(ProviderError::Timeout(format!(
                            "no response within {}s",
                            timeout.as_secs_f64()
                        )))
                    })
                }
            };

            match result {
                Ok(turn) => return Ok(turn),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        trace_id = %trace.id(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    if let Some(tx) = events {
                        let _ = tx.send(AgentStreamEvent::Retry {
                            attempt,
                            reason: e.to_string(),
                        });
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AbortReason::Cancelled),
                        _ = tokio::time::sleep(self.config.retry_backoff * attempt) => {}
                    }
                }
                Err(e) => {
                    error!(trace_id = %trace.id(), attempt, error = %e, "Model call failed");
                    return Err(AbortReason::ModelUnavailable(e.to_string()));
                }
            }
        }
    }

    async fn request_turn(
        &self,
        request: ProviderRequest,
        round: u32,
        events: Option<&EventTx>,
    ) -> Result<AggregatedTurn, ProviderError> {
        if !request.stream {
            let response = self.provider.complete(request).await?;
            let message = response.message;
            if let Some(tx) = events.filter(|_| !message.content.is_empty()) {
                let _ = tx.send(AgentStreamEvent::Chunk {
                    content: message.content.clone(),
                });
            }
            return Ok(AggregatedTurn {
                tool_calls: message.tool_calls.iter().map(ToolCallRequest::from).collect(),
                content: message.content,
                usage: response.usage,
            });
        }

        let mut rx = self.provider.stream(request).await?;
        let mut aggregator = StreamAggregator::new(round);
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let (Some(tx), Some(text)) = (events, chunk.content.as_deref()) {
                if !text.is_empty() {
                    let _ = tx.send(AgentStreamEvent::Chunk {
                        content: text.to_string(),
                    });
                }
            }
            aggregator.push(chunk);
            if aggregator.is_done() {
                break;
            }
        }

        if !aggregator.is_done() {
            return Err(ProviderError::StreamInterrupted(
                "stream closed before the end marker".into(),
            ));
        }
        Ok(aggregator.finish())
    }

    fn finish(
        &self,
        transcript: Transcript,
        trace: &TraceContext,
        rounds: u32,
        usage: Usage,
        result: Result<String, AbortReason>,
    ) -> AgentRun {
        let outcome = match result {
            Ok(content) => {
                info!(
                    trace_id = %trace.id(),
                    rounds,
                    total_tokens = usage.total_tokens,
                    "Run completed"
                );
                emit(
                    self.sink.as_ref(),
                    trace,
                    EventKind::RunCompleted,
                    json!({ "rounds": rounds, "total_tokens": usage.total_tokens }),
                );
                RunOutcome::Completed { content }
            }
            Err(reason) => {
                warn!(
                    trace_id = %trace.id(),
                    rounds,
                    reason = %reason,
                    kind = reason.kind(),
                    "Run aborted"
                );
                emit(
                    self.sink.as_ref(),
                    trace,
                    EventKind::RunAborted,
                    json!({ "rounds": rounds, "reason": reason.kind(), "detail": reason.to_string() }),
                );
                RunOutcome::Aborted {
                    partial: transcript
                        .last_assistant_content()
                        .unwrap_or_default()
                        .to_string(),
                    reason,
                }
            }
        };

        AgentRun {
            outcome,
            transcript,
            rounds,
            trace_id: trace.id().clone(),
            usage,
        }
    }
}

fn build_gateway(
    registry: &Arc<ToolRegistry>,
    config: &LoopConfig,
    sink: &Arc<dyn EventSink>,
) -> ToolGateway {
    ToolGateway::new(registry.clone())
        .with_timeout(config.tool_timeout)
        .with_max_concurrent(config.max_concurrent_tools)
        .with_sink(sink.clone())
}

/// Results go in request order, whatever order they completed in.
fn append_results(transcript: &mut Transcript, results: &[ToolResult]) -> Result<(), TranscriptError> {
    for result in results {
        transcript.push_tool_result(result.call_id.as_str(), result.to_transcript_content())?;
    }
    Ok(())
}
