//! Stock quote tool backed by Alpha Vantage

use super::{fetch_json, parse_input, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct StockPriceTool;

#[derive(Debug, Deserialize)]
struct StockInput {
    company_code: String,
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        "get_stock_price"
    }

    fn description(&self) -> String {
        "Fetch latest stock price of a company given its ticker symbol (e.g. 'AAPL', 'TSLA').".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["company_code"],
            "properties": {
                "company_code": {"type": "string", "description": "Ticker symbol"}
            }
        })
    }

    /// The provider body is returned as-is, error payloads included.
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: StockInput = parse_input(input)?;
        let request = ctx
            .http
            .get(format!("{}/query", ctx.config.alphavantage_url))
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", input.company_code.as_str()),
                ("apikey", ctx.config.alphavantage_key.as_str()),
            ]);

        let body = fetch_json("Alpha Vantage", request, false).await?;
        Ok(ToolOutput::json(body))
    }
}
