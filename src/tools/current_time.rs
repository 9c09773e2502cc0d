//! Clock tool - current time in an IANA timezone

use super::{parse_input, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct CurrentTimeTool;

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Deserialize)]
struct TimeInput {
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn time_in(timezone: &str, now: DateTime<Utc>) -> Result<Value, ToolError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| ToolError::UnknownTimezone(timezone.to_string()))?;
    let local = now.with_timezone(&tz);

    Ok(json!({
        "timezone": timezone,
        "time": local.format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &'static str {
        "get_current_time"
    }

    fn description(&self) -> String {
        "Get the current time in a chosen timezone (IANA name such as 'Asia/Kolkata'). Defaults to UTC.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timezone": {"type": "string", "description": "IANA timezone name", "default": "UTC"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: TimeInput = parse_input(input)?;
        time_in(&input.timezone, Utc::now()).map(ToolOutput::json)
    }
}
