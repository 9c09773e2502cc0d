//! Weather tool backed by wttr.in

use super::{fetch_json, parse_input, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER: &str = "wttr.in";

pub struct WeatherTool;

#[derive(Debug, Deserialize)]
struct WeatherInput {
    city: String,
}

/// Reduce a `format=j1` payload to city, temperature and condition.
///
/// Missing fields become `null`.
fn normalize(city: &str, data: &Value) -> Value {
    let current = data.pointer("/current_condition/0");
    let temperature = current
        .and_then(|c| c.get("temp_C"))
        .cloned()
        .unwrap_or(Value::Null);
    let condition = current
        .and_then(|c| c.pointer("/weatherDesc/0/value"))
        .cloned()
        .unwrap_or(Value::Null);

    json!({
        "city": city,
        "temperature": temperature,
        "condition": condition,
    })
}

fn weather_url(base: &str, city: &str) -> Result<Url, ToolError> {
    let invalid = |message: String| ToolError::Provider {
        provider: PROVIDER,
        message,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(format!("bad base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| invalid(format!("base URL cannot take a path: {base}")))?
        .pop_if_empty()
        .push(city);
    url.query_pairs_mut().append_pair("format", "j1");
    Ok(url)
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> String {
        "Get current weather details for a city.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["city"],
            "properties": {
                "city": {"type": "string", "description": "City name, e.g. London"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: WeatherInput = parse_input(input)?;
        let url = weather_url(&ctx.config.wttr_url, &input.city)?;

        let data = fetch_json(PROVIDER, ctx.http.get(url).timeout(TIMEOUT), true).await?;
        Ok(ToolOutput::json(normalize(&input.city, &data)))
    }
}
