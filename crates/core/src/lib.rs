//! # workagent Core
//!
//! Domain types, traits, and error definitions for the workagent tool-calling
//! runtime. This crate performs **no I/O**: it defines the domain model that
//! the orchestration loop, the tools, and the model transports implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`Tool`, `ToolSource`, `Provider`, `EventSink`).
//! Implementations live in their respective crates. This enables:
//! - Swapping model transports via configuration
//! - Easy testing with scripted providers and closure-backed tools
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod tool;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError, TranscriptError};
pub use event::{EventBus, EventKind, EventSink, NullSink, ObservabilityEvent, SinkError};
pub use message::{Message, MessageToolCall, Role, Transcript};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use registry::{
    DiscoveryError, DiscoveryProblem, SourceError, StaticSource, ToolRegistry, ToolSource,
};
pub use schema::{ParameterSchema, SchemaError, SchemaViolation};
pub use tool::{
    FailureKind, FnTool, Tool, ToolArguments, ToolCallRequest, ToolContext, ToolDescriptor,
    ToolOutcome, ToolOutput, ToolResult,
};
pub use trace::{TraceContext, TraceId};
