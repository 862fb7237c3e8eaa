//! Shell echo tool: a safe stand-in for command execution.
//!
//! Nothing is ever run; the text is echoed back with a prefix. Input that
//! contains shell metacharacters is refused outright.

use async_trait::async_trait;
use tracing::warn;
use workagent_core::error::ToolError;
use workagent_core::tool::{Tool, ToolContext, ToolOutput};

const METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>'];

pub struct ShellEchoTool;

impl ShellEchoTool {
    fn find_metacharacter(text: &str) -> Option<char> {
        text.chars().find(|c| METACHARACTERS.contains(c))
    }
}

#[async_trait]
impl Tool for ShellEchoTool {
    fn name(&self) -> &str {
        "shell_echo"
    }

    fn description(&self) -> &str {
        "Echo text back with an [ECHO] prefix. Does not execute commands; input containing shell metacharacters is rejected."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default();

        if let Some(bad) = Self::find_metacharacter(text) {
            warn!(trace_id = %ctx.trace.id(), call_id = %ctx.call_id, character = %bad, "Rejected echo input");
            return Err(ToolError::PermissionDenied {
                tool_name: "shell_echo".into(),
                reason: format!("input contains shell metacharacter '{bad}'"),
            });
        }

        Ok(ToolOutput::text(format!("[ECHO] {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use workagent_core::TraceContext;

    fn ctx() -> ToolContext {
        ToolContext::new(TraceContext::new(), "call_1", CancellationToken::new())
    }

    #[tokio::test]
    async fn echoes_with_prefix() {
        let out = ShellEchoTool
            .execute(serde_json::json!({"text": "hello world"}), ctx())
            .await
            .unwrap();
        assert_eq!(out.text, "[ECHO] hello world");
    }

    #[tokio::test]
    async fn metacharacters_rejected() {
        for input in ["ls; rm -rf /", "a && b", "cat x | sh", "`id`", "$(whoami)", "a > b"] {
            let result = ShellEchoTool
                .execute(serde_json::json!({ "text": input }), ctx())
                .await;
            assert!(
                matches!(result, Err(ToolError::PermissionDenied { .. })),
                "{input} should be rejected"
            );
        }
    }
}
