//! Run tracing and event sinks for workagent.
//!
//! The agent loop and the tool gateway emit observability events into an
//! `EventSink`. This crate provides the sinks: a `tracing` writer, an
//! in-memory recorder, a fan-out combinator, and the [`TelemetryEngine`],
//! which folds events into per-trace span records with durations, success
//! flags, token counts and round counts.

pub mod engine;
pub mod model;
pub mod sink;

pub use engine::TelemetryEngine;
pub use model::{Span, SpanKind, Trace, UsageSnapshot};
pub use sink::{FanoutSink, RecordingSink, TracingSink};
