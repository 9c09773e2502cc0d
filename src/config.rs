//! Server configuration from the environment

use crate::graph::DEFAULT_MAX_TOOL_ROUNDS;
use crate::llm::DEFAULT_MODEL;
use crate::tools::ToolsConfig;

const DEFAULT_DB_PATH: &str = "chatbot.db";
const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Option<String>,
    pub db_path: String,
    pub port: u16,
    pub max_tool_rounds: u32,
    pub tools: ToolsConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut tools = ToolsConfig::default();
        if let Some(key) = get("ALPHAVANTAGE_API_KEY") {
            tools.alphavantage_key = key;
        }

        Self {
            google_api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL"),
            db_path: get("CHATBOT_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            port: parse_or(get("CHATBOT_PORT"), "CHATBOT_PORT", DEFAULT_PORT),
            max_tool_rounds: parse_or(
                get("CHATBOT_MAX_TOOL_ROUNDS"),
                "CHATBOT_MAX_TOOL_ROUNDS",
                DEFAULT_MAX_TOOL_ROUNDS,
            ),
            tools,
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    value: Option<String>,
    key: &str,
    default: T,
) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Ignoring unparseable setting");
            default
        }),
    }
}
