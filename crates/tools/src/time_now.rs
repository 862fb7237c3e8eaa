//! Current time tool: no network, no timezone database.

use async_trait::async_trait;
use chrono::{FixedOffset, SecondsFormat, Utc};
use workagent_core::error::ToolError;
use workagent_core::tool::{Tool, ToolContext, ToolOutput};

pub struct CurrentTimeTool;

/// Parse `UTC`/`Z` or a fixed offset such as `+08:00`, `-0530`.
fn parse_zone(name: &str) -> Option<FixedOffset> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("utc") || name.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match name.as_bytes().first()? {
        b'+' => (1, &name[1..]),
        b'-' => (-1, &name[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in RFC 3339 format. Defaults to UTC; a fixed offset like +08:00 is also accepted."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timezone_name": {
                    "type": "string",
                    "description": "\"UTC\" (default) or a fixed UTC offset such as \"+08:00\""
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let zone_name = arguments["timezone_name"].as_str().unwrap_or("UTC");
        let offset = parse_zone(zone_name).ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "unsupported timezone '{zone_name}'; use UTC or an offset like +08:00"
            ))
        })?;

        let now = Utc::now().with_timezone(&offset);
        Ok(ToolOutput::text(now.to_rfc3339_opts(SecondsFormat::Secs, true)))
    }
}
