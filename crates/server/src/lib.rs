//! HTTP API for workagent.
//!
//! Routes:
//! - `GET /health`: liveness and version
//! - `GET /tools`: the registry as the model sees it
//! - `POST /run`: one prompt through the agent loop, under a caller-supplied
//!   or generated trace id
//!
//! Built on Axum. Each run gets a child of the server's shutdown token, so
//! stopping the server cancels runs still in flight.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use workagent_agent::{AbortReason, AgentLoop, AgentRun, RunOutcome};
use workagent_core::trace::TraceContext;

/// Shared state behind every route.
pub struct ServerState {
    pub agent: Arc<AgentLoop>,
    /// Cancelled when the server stops
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self {
            agent,
            shutdown: CancellationToken::new(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Build the router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/run", post(run_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `addr` until `shutdown` resolves; in-flight runs are cancelled then.
pub async fn serve(
    state: SharedState,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");

    let token = state.shutdown.clone();
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down HTTP API");
            token.cancel();
        })
        .await
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_input: String,
    /// Reuse this trace id instead of generating one
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// Outcome of one run.
///
/// `success` is false exactly when the run aborted; `content` then holds
/// whatever partial answer the model produced.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub content: String,
    pub trace_id: String,
    pub success: bool,
    pub rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&AgentRun> for RunResponse {
    fn from(run: &AgentRun) -> Self {
        let (error_kind, error_message) = match run.abort_reason() {
            Some(reason) => (Some(reason.kind().to_string()), Some(reason.to_string())),
            None => (None, None),
        };
        Self {
            content: run.content().to_string(),
            trace_id: run.trace_id.to_string(),
            success: run.is_completed(),
            rounds: run.rounds,
            error_kind,
            error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Round-limit aborts are an answer about the request; the rest are failures
/// on this side of the API.
fn status_for(outcome: &RunOutcome) -> StatusCode {
    match outcome {
        RunOutcome::Completed { .. } => StatusCode::OK,
        RunOutcome::Aborted { reason, .. } => match reason {
            AbortReason::RoundLimitExceeded { .. } => StatusCode::OK,
            AbortReason::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AbortReason::ModelUnavailable(_) => StatusCode::BAD_GATEWAY,
            AbortReason::ProtocolViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

// --- Handlers ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let defs = state.agent.registry().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}

async fn run_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RunRequest>,
) -> Result<(StatusCode, Json<RunResponse>), (StatusCode, Json<ErrorResponse>)> {
    if payload.user_input.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "user_input must not be empty".into(),
            }),
        ));
    }

    let trace = match payload.trace_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => TraceContext::with_id(id),
        None => TraceContext::new(),
    };
    info!(trace_id = %trace.id(), input_len = payload.user_input.len(), "Run request received");

    let cancel = state.shutdown.child_token();
    let run = state
        .agent
        .run_prompt(payload.user_input, &trace, &cancel)
        .await;

    let status = status_for(&run.outcome);
    if let Some(reason) = run.abort_reason() {
        warn!(trace_id = %run.trace_id, kind = reason.kind(), %reason, "Run aborted");
    }
    Ok((status, Json(RunResponse::from(&run))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tower::ServiceExt;

    use serde_json::json;
    use workagent_agent::LoopConfig;
    use workagent_core::error::ProviderError;
    use workagent_core::message::{Message, MessageToolCall};
    use workagent_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use workagent_core::registry::{StaticSource, ToolRegistry};
    use workagent_core::tool::{FnTool, ToolOutput};

    /// Replays canned responses and records the trace id of every request.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        trace_ids: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                trace_ids: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.trace_ids.lock().unwrap().push(request.trace_id);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text("script exhausted")))
        }
    }

    fn text(content: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(content),
            usage: None,
            model: "mock-model".into(),
        }
    }

    fn echo_call(id: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant_with_tools(
                "",
                vec![MessageToolCall {
                    id: id.into(),
                    name: "echo".into(),
                    arguments: r#"{"text": "hi"}"#.into(),
                }],
            ),
            usage: None,
            model: "mock-model".into(),
        }
    }

    fn test_state(provider: Arc<ScriptedProvider>, max_rounds: u32) -> SharedState {
        let echo = FnTool::new(
            "echo",
            "Echo the text back",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
            |args, _ctx| async move {
                Ok(ToolOutput::text(args["text"].as_str().unwrap_or_default()))
            },
        );
        let source = StaticSource::new("test").with_tool(echo);
        let registry = Arc::new(ToolRegistry::discover(&[&source]).unwrap());
        let config = LoopConfig {
            max_rounds,
            model_max_attempts: 1,
            ..LoopConfig::default()
        };
        let agent = AgentLoop::new(provider, registry, "mock-model").with_config(config);
        Arc::new(ServerState::new(Arc::new(agent)))
    }

    fn run_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(Arc::new(ScriptedProvider::new(vec![])), 3));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn list_tools() {
        let app = build_router(test_state(Arc::new(ScriptedProvider::new(vec![])), 3));

        let req = Request::builder()
            .uri("/tools")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: ToolListResponse = body_json(response).await;
        assert_eq!(json.count, 1);
        assert_eq!(json.tools[0].name, "echo");
        assert_eq!(json.tools[0].parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn run_completes_under_given_trace_id() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(echo_call("call_1")),
            Ok(text("The echo said hi.")),
        ]));
        let app = build_router(test_state(provider.clone(), 3));

        let response = app
            .oneshot(run_request(json!({"user_input": "echo hi", "trace_id": "req_http_1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let run: RunResponse = body_json(response).await;
        assert!(run.success);
        assert_eq!(run.content, "The echo said hi.");
        assert_eq!(run.trace_id, "req_http_1");
        assert_eq!(run.rounds, 1);
        assert!(run.error_kind.is_none());
        assert_eq!(
            *provider.trace_ids.lock().unwrap(),
            vec![Some("req_http_1".to_string()), Some("req_http_1".to_string())]
        );
    }

    #[tokio::test]
    async fn run_without_trace_id_gets_a_fresh_one() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text("hello"))]));
        let app = build_router(test_state(provider, 3));

        let response = app
            .oneshot(run_request(json!({"user_input": "hi"})))
            .await
            .unwrap();
        let run: RunResponse = body_json(response).await;
        assert!(run.success);
        assert!(!run.trace_id.is_empty());
    }

    #[tokio::test]
    async fn round_limit_reports_abort_reason() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(echo_call("call_1")),
            Ok(echo_call("call_2")),
        ]));
        let app = build_router(test_state(provider, 1));

        let response = app
            .oneshot(run_request(json!({"user_input": "loop forever"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let run: RunResponse = body_json(response).await;
        assert!(!run.success);
        assert_eq!(run.error_kind.as_deref(), Some("round-limit-exceeded"));
        assert!(run.error_message.unwrap().contains("round limit of 1"));
    }

    #[tokio::test]
    async fn unavailable_model_is_bad_gateway() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let app = build_router(test_state(provider, 3));

        let response = app
            .oneshot(run_request(json!({"user_input": "hi", "trace_id": "req_down"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let run: RunResponse = body_json(response).await;
        assert!(!run.success);
        assert_eq!(run.trace_id, "req_down");
        assert_eq!(run.error_kind.as_deref(), Some("model-unavailable"));
    }

    #[tokio::test]
    async fn shutdown_cancels_runs() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text("never seen"))]));
        let state = test_state(provider, 3);
        state.shutdown.cancel();
        let app = build_router(state);

        let response = app
            .oneshot(run_request(json!({"user_input": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let run: RunResponse = body_json(response).await;
        assert_eq!(run.error_kind.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn blank_input_rejected() {
        let app = build_router(test_state(Arc::new(ScriptedProvider::new(vec![])), 3));

        let response = app
            .oneshot(run_request(json!({"user_input": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err: ErrorResponse = body_json(response).await;
        assert!(err.error.contains("user_input"));
    }
}
