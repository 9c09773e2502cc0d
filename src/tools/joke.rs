use super::{fetch_json, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct JokeTool;

#[async_trait]
impl Tool for JokeTool {
    fn name(&self) -> &'static str {
        "get_joke"
    }

    fn description(&self) -> String {
        "Return a random joke.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let url = format!("{}/random_joke", ctx.config.jokes_url);
        fetch_json("official-joke-api", ctx.http.get(url), true)
            .await
            .map(ToolOutput::json)
    }
}
