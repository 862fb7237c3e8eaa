//! The agent core: the heart of workagent.
//!
//! A run follows a **model → tools → model** cycle:
//!
//! 1. **Send** the transcript and the registry's tool list to the model
//! 2. **If tool calls**: run them through the [`ToolGateway`], append the
//!    results in request order, loop back to step 1
//! 3. **If text**: that is the final answer
//!
//! The loop stops on a final answer, or aborts on the round limit,
//! cancellation, an unavailable model, or a transcript protocol violation.

pub mod aggregator;
pub mod gateway;
pub mod loop_runner;
mod observe;
pub mod outcome;
pub mod stream_event;

pub use aggregator::{AggregatedTurn, StreamAggregator};
pub use gateway::ToolGateway;
pub use loop_runner::{AgentLoop, LoopConfig};
pub use outcome::{AbortReason, AgentRun, RunOutcome};
pub use stream_event::AgentStreamEvent;
