//! Random fact tool backed by uselessfacts

use super::{fetch_json, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct RandomFactTool;

#[async_trait]
impl Tool for RandomFactTool {
    fn name(&self) -> &'static str {
        "get_random_fact"
    }

    fn description(&self) -> String {
        "Return a random interesting fact.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let request = ctx
            .http
            .get(format!("{}/random.json", ctx.config.facts_url))
            .query(&[("language", "en")]);

        let body = fetch_json("uselessfacts", request, true).await?;
        Ok(ToolOutput::json(body.get("text").cloned().unwrap_or(Value::Null)))
    }
}
