//! Currency conversion tool backed by exchangerate-api

use super::{fetch_json, parse_input, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ConvertCurrencyTool;

#[derive(Debug, Deserialize)]
struct CurrencyInput {
    amount: f64,
    from_currency: String,
    to_currency: String,
}

fn convert(amount: f64, from: &str, to: &str, rates: &Value) -> Result<Value, ToolError> {
    let rate = rates
        .pointer(&format!("/rates/{to}"))
        .and_then(Value::as_f64)
        .ok_or_else(|| ToolError::MissingRate {
            from: from.to_string(),
            to: to.to_string(),
        })?;

    let converted = (amount * rate * 100.0).round() / 100.0;
    Ok(json!({
        "converted_amount": converted,
        "rate": rate,
    }))
}

#[async_trait]
impl Tool for ConvertCurrencyTool {
    fn name(&self) -> &'static str {
        "convert_currency"
    }

    fn description(&self) -> String {
        "Convert an amount between currencies using the latest exchange rate.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["amount", "from_currency", "to_currency"],
            "properties": {
                "amount": {"type": "number"},
                "from_currency": {"type": "string", "description": "ISO code, e.g. USD"},
                "to_currency": {"type": "string", "description": "ISO code, e.g. INR"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: CurrencyInput = parse_input(input)?;
        let from = input.from_currency.to_uppercase();
        let to = input.to_currency.to_uppercase();

        let url = format!("{}/v4/latest/{from}", ctx.config.exchange_rate_url);
        let rates = fetch_json("exchangerate-api", ctx.http.get(url), true).await?;
        convert(input.amount, &from, &to, &rates).map(ToolOutput::json)
    }
}
