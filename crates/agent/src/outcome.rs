//! What a run hands back to its caller.

use thiserror::Error;
use workagent_core::error::TranscriptError;
use workagent_core::message::Transcript;
use workagent_core::provider::Usage;
use workagent_core::trace::TraceId;

/// Why a run stopped before the model gave a final answer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbortReason {
    #[error("round limit of {limit} exceeded")]
    RoundLimitExceeded { limit: u32 },

    #[error("run was cancelled")]
    Cancelled,

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("transcript protocol violated: {0}")]
    ProtocolViolation(TranscriptError),
}

impl AbortReason {
    /// Stable label used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoundLimitExceeded { .. } => "round-limit-exceeded",
            Self::Cancelled => "cancelled",
            Self::ModelUnavailable(_) => "model-unavailable",
            Self::ProtocolViolation(_) => "protocol-violation",
        }
    }
}

/// Terminal state of a run. Completion and abort never share a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        content: String,
    },
    Aborted {
        reason: AbortReason,
        /// Latest non-empty assistant text, if the model said anything
        partial: String,
    },
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: RunOutcome,

    /// The transcript as it stood when the run stopped
    pub transcript: Transcript,

    /// Tool rounds executed
    pub rounds: u32,

    pub trace_id: TraceId,

    /// Summed over every model call that reported usage
    pub usage: Usage,
}

impl AgentRun {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    /// Final answer, or whatever partial content an aborted run produced.
    pub fn content(&self) -> &str {
        match &self.outcome {
            RunOutcome::Completed { content } => content,
            RunOutcome::Aborted { partial, .. } => partial,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.outcome {
            RunOutcome::Aborted { reason, .. } => Some(reason),
            RunOutcome::Completed { .. } => None,
        }
    }
}
