//! Streaming aggregator: rebuilds complete tool calls from fragments.
//!
//! Model transports deliver tool calls in pieces: the id and name usually
//! arrive once, in the first fragment for an index, and argument text
//! trickles in over many chunks. The aggregator keeps one buffer per
//! transport index and only turns buffers into [`ToolCallRequest`]s when the
//! turn's stream has ended. It never executes anything.

use std::collections::BTreeMap;

use workagent_core::provider::{StreamChunk, ToolCallDelta, Usage};
use workagent_core::tool::ToolCallRequest;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    fragments: usize,
}

/// Everything the model said in one streamed turn.
#[derive(Debug, Clone, Default)]
pub struct AggregatedTurn {
    pub content: String,
    /// Ordered by transport index
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

/// Per-turn accumulation state.
#[derive(Debug)]
pub struct StreamAggregator {
    round: u32,
    content: String,
    buffers: BTreeMap<u32, PartialCall>,
    usage: Option<Usage>,
    done: bool,
}

impl StreamAggregator {
    /// `round` only feeds the fallback ids of calls that never got one.
    pub fn new(round: u32) -> Self {
        Self {
            round,
            content: String::new(),
            buffers: BTreeMap::new(),
            usage: None,
            done: false,
        }
    }

    /// Fold one chunk in.
    pub fn push(&mut self, chunk: StreamChunk) {
        if let Some(text) = chunk.content {
            self.content.push_str(&text);
        }
        for delta in chunk.tool_calls {
            self.push_delta(delta);
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        if chunk.done {
            self.done = true;
        }
    }

    /// Merge a single tool-call fragment into its index's buffer.
    pub fn push_delta(&mut self, delta: ToolCallDelta) {
        let buf = self.buffers.entry(delta.index).or_default();
        buf.fragments += 1;

        // First non-empty id/name wins; later repeats are ignored
        if buf.id.is_none() {
            buf.id = delta.id.filter(|s| !s.is_empty());
        }
        if buf.name.is_none() {
            buf.name = delta.name.filter(|s| !s.is_empty());
        }
        if let Some(args) = delta.arguments {
            buf.arguments.push_str(&args);
        }
    }

    /// Whether the transport signalled the end of the turn.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of distinct tool-call indices seen so far.
    pub fn pending_calls(&self) -> usize {
        self.buffers.len()
    }

    /// Finalize every buffer into a request.
    ///
    /// Argument text that does not parse yields a request carrying
    /// `ToolArguments::Malformed`; the gateway rejects it without executing.
    pub fn finish(self) -> AggregatedTurn {
        let round = self.round;
        let tool_calls = self
            .buffers
            .into_iter()
            .map(|(index, buf)| {
                let id = buf.id.unwrap_or_else(|| format!("call_{round}_{index}"));
                let name = buf.name.unwrap_or_default();
                tracing::trace!(index, %id, %name, fragments = buf.fragments, "Tool call reassembled");
                ToolCallRequest::from_raw(id, name, &buf.arguments)
            })
            .collect();

        AggregatedTurn {
            content: self.content,
            tool_calls,
            usage: self.usage,
        }
    }
}
