//! Tool implementations for the chat agent
//!
//! Tools are stateless singletons; everything a call needs arrives through
//! `ToolContext`.

mod calculator;
mod currency;
mod current_time;
mod joke;
mod random_fact;
mod stock_price;
mod weather;
mod web_search;

pub use calculator::{CalculatorTool, DIVIDE_BY_ZERO};
pub use currency::ConvertCurrencyTool;
pub use current_time::CurrentTimeTool;
pub use joke::JokeTool;
pub use random_fact::RandomFactTool;
pub use stock_price::StockPriceTool;
pub use weather::WeatherTool;
pub use web_search::WebSearchTool;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::graph::ToolCall;
use crate::llm::ToolDefinition;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Value,
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            content: Value::String(s.into()),
        }
    }

    pub fn json(content: Value) -> Self {
        Self { content }
    }
}

/// Errors raised by tools
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Request to {provider} failed: {message}")]
    Http {
        provider: &'static str,
        message: String,
    },
    #[error("Unexpected response from {provider}: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
    #[error("No exchange rate from {from} to {to}")]
    MissingRate { from: String, to: String },
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// Recoverable errors are reported back to the model as a tool result;
    /// everything else ends the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UnknownTool(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Provider { .. } => "provider",
            Self::MissingRate { .. } => "missing_rate",
            Self::UnknownTimezone(_) => "unknown_timezone",
            Self::InvalidInput(_) => "invalid_input",
            Self::UnknownTool(_) => "unknown_tool",
        }
    }
}

/// Alpha Vantage's public key; it only serves quotes for IBM
pub const DEMO_ALPHAVANTAGE_KEY: &str = "demo";

/// Provider endpoints and credentials used by the tools
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub duckduckgo_url: String,
    pub alphavantage_url: String,
    pub alphavantage_key: String,
    pub wttr_url: String,
    pub exchange_rate_url: String,
    pub facts_url: String,
    pub jokes_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            duckduckgo_url: "https://api.duckduckgo.com".to_string(),
            alphavantage_url: "https://www.alphavantage.co".to_string(),
            alphavantage_key: DEMO_ALPHAVANTAGE_KEY.to_string(),
            wttr_url: "https://wttr.in".to_string(),
            exchange_rate_url: "https://api.exchangerate-api.com".to_string(),
            facts_url: "https://uselessfacts.jsph.pl".to_string(),
            jokes_url: "https://official-joke-api.appspot.com".to_string(),
        }
    }
}

impl ToolsConfig {
    /// Whether stock quotes are limited to the demo symbol
    pub fn uses_demo_stock_key(&self) -> bool {
        self.alphavantage_key == DEMO_ALPHAVANTAGE_KEY
    }

    /// Point every provider at one base URL (for tests against a mock server)
    #[cfg(test)]
    pub fn all_at(base: &str) -> Self {
        Self {
            duckduckgo_url: base.to_string(),
            alphavantage_url: base.to_string(),
            alphavantage_key: "demo".to_string(),
            wttr_url: base.to_string(),
            exchange_rate_url: base.to_string(),
            facts_url: base.to_string(),
            jokes_url: base.to_string(),
        }
    }
}

/// All context needed for a tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    /// Shared HTTP client
    pub http: Client,

    /// The thread this tool is executing within
    pub thread_id: String,

    pub config: Arc<ToolsConfig>,
}

impl ToolContext {
    pub fn new(http: Client, thread_id: impl Into<String>, config: Arc<ToolsConfig>) -> Self {
        Self {
            http,
            thread_id: thread_id.into(),
            config,
        }
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &'static str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool with all context provided via `ToolContext`
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError>;
}

/// Collection of tools available to conversations
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The standard tool set
    pub fn standard() -> Self {
        Self {
            tools: vec![
                Arc::new(WebSearchTool),
                Arc::new(CalculatorTool),
                Arc::new(StockPriceTool),
                Arc::new(WeatherTool),
                Arc::new(CurrentTimeTool),
                Arc::new(ConvertCurrencyTool),
                Arc::new(RandomFactTool),
                Arc::new(JokeTool),
            ],
        }
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool call with context
    pub async fn execute(&self, call: &ToolCall, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        tracing::debug!(
            thread_id = %ctx.thread_id,
            tool = %call.name,
            call_id = %call.id,
            "Dispatching tool"
        );
        tool.run(call.arguments.clone(), ctx).await
    }
}

// ============================================================================
// Helpers shared by the tools
// ============================================================================

/// Deserialize tool input; a missing argument object counts as empty
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    let input = if input.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        input
    };
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Send a request and decode a JSON body.
///
/// With `require_success`, non-2xx statuses are provider errors; otherwise the
/// body is returned whatever the status.
pub(crate) async fn fetch_json(
    provider: &'static str,
    request: RequestBuilder,
    require_success: bool,
) -> Result<Value, ToolError> {
    let response = request.send().await.map_err(|e| ToolError::Http {
        provider,
        message: e.to_string(),
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| ToolError::Http {
        provider,
        message: e.to_string(),
    })?;

    if require_success && !status.is_success() {
        return Err(ToolError::Provider {
            provider,
            message: format!("HTTP {status}: {body}"),
        });
    }

    serde_json::from_str(&body).map_err(|e| ToolError::Provider {
        provider,
        message: format!("invalid JSON ({e})"),
    })
}

#[cfg(test)]
pub(crate) fn test_context(base_url: &str) -> ToolContext {
    ToolContext::new(
        Client::new(),
        "test-thread",
        Arc::new(ToolsConfig::all_at(base_url)),
    )
}
